//! Content scraping via Firecrawl

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use desk_core::ToolKind;

use crate::toolbox::{check_status, required_str};
use crate::{Tool, ToolDefinition, ToolError};

const SCRAPE_URL: &str = "https://api.firecrawl.dev/v1/scrape";

/// Maximum characters of markdown returned to the model per page
const MAX_CONTENT_LENGTH: usize = 8000;

/// Page scraping tool
pub struct FirecrawlTools {
    client: Client,
    api_key: String,
}

impl FirecrawlTools {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    /// Scrape one page and return its markdown
    pub async fn scrape(&self, url: &str) -> Result<String, ToolError> {
        debug!("Scraping: {}", url);

        let response = self
            .client
            .post(SCRAPE_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "url": url,
                "formats": ["markdown"],
                "onlyMainContent": true
            }))
            .send()
            .await?;

        let body: ScrapeResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))?;

        scrape_markdown(body)
    }
}

#[async_trait]
impl Tool for FirecrawlTools {
    fn kind(&self) -> ToolKind {
        ToolKind::ContentScraping
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "scrape_website",
            "Scrape a web page and return its main content as markdown.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Absolute URL of the page"}
                },
                "required": ["url"]
            }),
        )]
    }

    async fn call(&self, function: &str, input: &Value) -> Result<String, ToolError> {
        match function {
            "scrape_website" => {
                let url = required_str(input, "url")?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ToolError::InvalidInput(format!("not an http(s) URL: {}", url)));
                }
                self.scrape(url).await
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

fn scrape_markdown(body: ScrapeResponse) -> Result<String, ToolError> {
    if !body.success {
        return Err(ToolError::Network(
            body.error.unwrap_or_else(|| "scrape failed".to_string()),
        ));
    }

    let markdown = body
        .data
        .and_then(|d| d.markdown)
        .ok_or_else(|| ToolError::Parse("response has no markdown".to_string()))?;

    Ok(truncate(&markdown, MAX_CONTENT_LENGTH))
}

/// Truncate on a character boundary
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_markdown_success() {
        let body: ScrapeResponse = serde_json::from_value(json!({
            "success": true,
            "data": {"markdown": "# Running shoes\n\n$89.99", "metadata": {"title": "Shoes"}}
        }))
        .unwrap();

        assert_eq!(scrape_markdown(body).unwrap(), "# Running shoes\n\n$89.99");
    }

    #[test]
    fn test_scrape_markdown_failure() {
        let body: ScrapeResponse = serde_json::from_value(json!({
            "success": false,
            "error": "Payment required"
        }))
        .unwrap();

        let err = scrape_markdown(body).unwrap_err();
        assert!(err.to_string().contains("Payment required"));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé...(truncated)");
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let tool = FirecrawlTools::new(Client::new(), "fc-key");
        let err = tool
            .call("scrape_website", &json!({"url": "file:///etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
