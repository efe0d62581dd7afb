//! Web search via DuckDuckGo's HTML endpoint
//!
//! Results are scraped from the no-JavaScript results page; redirect links
//! are unwrapped to the target URL.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use desk_core::ToolKind;

use crate::toolbox::{check_status, count_arg, required_str};
use crate::{Tool, ToolDefinition, ToolError};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebResult {
    pub title: String,
    pub href: String,
    pub body: String,
}

/// Keyword web search tool
pub struct WebSearchTools {
    client: Client,
}

impl WebSearchTools {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Search the web and return up to `max_results` hits
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, ToolError> {
        debug!("Web search: {}", query);

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .send()
            .await?;
        let html = check_status(response).await?.text().await?;

        let results = parse_results(&html, max_results);
        debug!("Web search returned {} results", results.len());
        Ok(results)
    }
}

#[async_trait]
impl Tool for WebSearchTools {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "duckduckgo_search",
            "Search the web with DuckDuckGo. Returns titles, links and snippets.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query"},
                    "max_results": {"type": "integer", "description": "Maximum results (default 5)"}
                },
                "required": ["query"]
            }),
        )]
    }

    async fn call(&self, function: &str, input: &Value) -> Result<String, ToolError> {
        match function {
            "duckduckgo_search" => {
                let query = required_str(input, "query")?;
                let max_results = count_arg(input, "max_results", 5, 20);
                let results = self.search(query, max_results).await?;
                serde_json::to_string(&results).map_err(|e| ToolError::Parse(e.to_string()))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

/// Parse DuckDuckGo HTML results
pub fn parse_results(html: &str, max_results: usize) -> Vec<WebResult> {
    let document = Html::parse_document(html);

    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let href = unwrap_redirect(link.value().attr("href")?);
            let title = collapse_whitespace(&link.text().collect::<String>());
            let body = result
                .select(&snippet_sel)
                .next()
                .map(|s| collapse_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();

            (!title.is_empty() && !href.is_empty()).then_some(WebResult { title, href, body })
        })
        .take(max_results)
        .collect()
}

/// Resolve `//duckduckgo.com/l/?uddg=<target>` redirect links
fn unwrap_redirect(href: &str) -> String {
    href.split(['?', '&'])
        .find_map(|part| part.strip_prefix("uddg="))
        .and_then(|target| urlencoding::decode(target).ok())
        .map(|target| target.into_owned())
        .unwrap_or_else(|| href.to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_HTML: &str = r##"
        <html><body>
          <div class="result results_links web-result">
            <h2 class="result__title">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fai%3Fa%3D1&amp;rut=abc">Latest   AI news</a>
            </h2>
            <a class="result__snippet" href="#">Models <b>shipped</b> this week.</a>
          </div>
          <div class="result results_links web-result">
            <h2 class="result__title">
              <a class="result__a" href="https://plain.example.org/">Plain link</a>
            </h2>
          </div>
          <div class="result result--ad">
            <span>no link here</span>
          </div>
        </body></html>
    "##;

    #[test]
    fn test_parse_results() {
        let results = parse_results(RESULTS_HTML, 10);
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].title, "Latest AI news");
        assert_eq!(results[0].href, "https://example.com/ai?a=1");
        assert_eq!(results[0].body, "Models shipped this week.");

        assert_eq!(results[1].href, "https://plain.example.org/");
        assert!(results[1].body.is_empty());
    }

    #[test]
    fn test_parse_results_respects_limit() {
        assert_eq!(parse_results(RESULTS_HTML, 1).len(), 1);
    }

    #[test]
    fn test_definitions() {
        let tool = WebSearchTools::new(Client::new());
        let defs = tool.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "duckduckgo_search");
        assert_eq!(defs[0].input_schema["required"][0], "query");
    }
}
