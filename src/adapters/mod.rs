//! Integration adapters.

/// Initialize tracing with a basic subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}
