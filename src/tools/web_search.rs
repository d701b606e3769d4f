//! Web search tool backed by DuckDuckGo HTML search (no API key required).

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::tools::{Tool, ToolError, ToolFuture};

/// Base URL for DuckDuckGo HTML search.
const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// One web search hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Resolved result URL.
    pub url: String,
    /// Result snippet.
    pub snippet: String,
    /// Result domain.
    pub domain: String,
}

/// Web search tool.
pub struct WebSearchTool {
    client: reqwest::Client,
    max_results: usize,
}

impl WebSearchTool {
    /// Create a web search tool with its own HTTP client.
    #[must_use]
    pub fn new(max_results: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_results,
        }
    }

    async fn search(&self, question: &str) -> Result<Vec<SearchResult>, ToolError> {
        let params = vec![("q", question.to_string()), ("b", String::new())];

        let response = self.client.post(DDG_HTML_URL).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(ToolError::UpstreamStatus(response.status().to_string()));
        }

        let html = response.text().await?;
        let results = parse_results(&html, self.max_results)?;
        if results.is_empty() {
            return Err(ToolError::NoResults(question.to_string()));
        }

        Ok(results)
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "function",
            "function": {
                "name": "web_search",
                "description": "Search information in the web",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "question": {
                            "type": "string",
                            "description": "Question, e.g. Who is Messi?"
                        }
                    },
                    "required": ["question"]
                }
            }
        })
    }

    fn base_context(&self) -> &'static str {
        "Use the web_search function to retrieve live data from the internet."
    }

    fn invoke(
        &self,
        parameters: serde_json::Value,
    ) -> ToolFuture<'_, Result<serde_json::Value, ToolError>> {
        Box::pin(async move {
            let question = parameters
                .get("question")
                .and_then(serde_json::Value::as_str)
                .filter(|q| !q.trim().is_empty())
                .ok_or(ToolError::MissingParameter("question"))?
                .to_owned();

            let results = self.search(&question).await?;
            Ok(serde_json::to_value(results)?)
        })
    }
}

/// Parse DuckDuckGo HTML results.
fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>, ToolError> {
    let document = Html::parse_document(html);

    let result_selector = Selector::parse(".result")
        .map_err(|e| ToolError::HtmlParse(format!("Invalid selector: {e:?}")))?;
    let title_selector = Selector::parse(".result__a")
        .map_err(|e| ToolError::HtmlParse(format!("Invalid selector: {e:?}")))?;
    let snippet_selector = Selector::parse(".result__snippet")
        .map_err(|e| ToolError::HtmlParse(format!("Invalid selector: {e:?}")))?;
    let url_selector = Selector::parse(".result__url")
        .map_err(|e| ToolError::HtmlParse(format!("Invalid selector: {e:?}")))?;

    let mut results = Vec::new();

    for element in document.select(&result_selector) {
        if results.len() >= max_results {
            break;
        }

        let title = element
            .select(&title_selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let url = element
            .select(&title_selector)
            .next()
            .and_then(|e| e.value().attr("href"))
            .map(extract_url_from_ddg_redirect)
            .unwrap_or_default();
        if url.is_empty() {
            continue;
        }

        let snippet = element
            .select(&snippet_selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let display_url = element
            .select(&url_selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let domain = extract_domain(&url).unwrap_or(display_url);

        results.push(SearchResult {
            title,
            url,
            snippet,
            domain,
        });
    }

    Ok(results)
}

/// Extract the actual URL from DuckDuckGo's redirect URL.
fn extract_url_from_ddg_redirect(href: &str) -> String {
    // DuckDuckGo uses redirect URLs like:
    // //duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...
    if let Some(uddg_start) = href.find("uddg=") {
        let start = uddg_start + 5;
        let end = href[start..].find('&').map_or(href.len(), |i| start + i);
        let encoded = &href[start..end];
        urlencoding::decode(encoded)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| encoded.to_string())
    } else if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    }
}

/// Extract domain from URL.
fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
}
