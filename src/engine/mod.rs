//! Context engine orchestration module.

pub mod core;

pub use core::{ContextBackends, ContextEngine};
