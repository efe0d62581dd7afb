//! Semantic web search via Exa

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use desk_core::ToolKind;

use crate::scraping::truncate;
use crate::toolbox::{check_status, count_arg, required_str};
use crate::{Tool, ToolDefinition, ToolError};

const SEARCH_URL: &str = "https://api.exa.ai/search";

/// Characters of page text kept per result
const TEXT_LENGTH_LIMIT: usize = 1000;

/// Semantic search tool
pub struct ExaTools {
    client: Client,
    api_key: String,
}

/// One semantic search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExaResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, rename = "publishedDate", skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    results: Vec<ExaResult>,
}

impl ExaTools {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    pub async fn search(&self, query: &str, num_results: usize) -> Result<Vec<ExaResult>, ToolError> {
        debug!("Exa search: {}", query);

        let response = self
            .client
            .post(SEARCH_URL)
            .header("x-api-key", &self.api_key)
            .json(&json!({
                "query": query,
                "numResults": num_results,
                "type": "auto",
                "contents": {"text": {"maxCharacters": TEXT_LENGTH_LIMIT}}
            }))
            .send()
            .await?;

        let body: ExaResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))?;

        Ok(trim_results(body.results))
    }
}

#[async_trait]
impl Tool for ExaTools {
    fn kind(&self) -> ToolKind {
        ToolKind::SemanticSearch
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "search_exa",
            "Semantic web search. Describe what you are looking for in natural language.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Natural language search query"},
                    "num_results": {"type": "integer", "description": "Number of results (default 5)"}
                },
                "required": ["query"]
            }),
        )]
    }

    async fn call(&self, function: &str, input: &Value) -> Result<String, ToolError> {
        match function {
            "search_exa" => {
                let query = required_str(input, "query")?;
                let num_results = count_arg(input, "num_results", 5, 10);
                let results = self.search(query, num_results).await?;
                serde_json::to_string(&results).map_err(|e| ToolError::Parse(e.to_string()))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

/// Cap page text even when the service ignores `maxCharacters`
fn trim_results(results: Vec<ExaResult>) -> Vec<ExaResult> {
    results
        .into_iter()
        .map(|mut r| {
            r.text = r.text.map(|t| truncate(&t, TEXT_LENGTH_LIMIT));
            r
        })
        .collect()
}
