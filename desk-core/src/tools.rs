//! External tool capabilities a persona may be wired to

use serde::{Deserialize, Serialize};
use std::fmt;

/// An external capability the agent may invoke on behalf of a persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Keyword web search (DuckDuckGo)
    WebSearch,
    /// Stock prices, analyst recommendations, company info and news
    MarketData,
    /// Fetch a web page as markdown (Firecrawl)
    ContentScraping,
    /// Neural/semantic web search (Exa)
    SemanticSearch,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolKind::WebSearch => "web search",
            ToolKind::MarketData => "market data",
            ToolKind::ContentScraping => "content scraping",
            ToolKind::SemanticSearch => "semantic search",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_and_display() {
        let kind: ToolKind = serde_json::from_str("\"content_scraping\"").unwrap();
        assert_eq!(kind, ToolKind::ContentScraping);
        assert_eq!(ToolKind::SemanticSearch.to_string(), "semantic search");
    }
}
