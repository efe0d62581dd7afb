//! Shared HTTP client for tool calls

use reqwest::Client;
use std::time::Duration;

use crate::ToolError;

/// HTTP settings for tool calls
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random browser user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create the HTTP client shared by all tools
///
/// Search and finance endpoints reject obvious bot user agents, so a browser
/// one is picked at construction. Cookies are kept for the Yahoo session.
pub fn create_http_client(config: &HttpConfig) -> Result<Client, ToolError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(random_user_agent())
        .cookie_store(true)
        .build()
        .map_err(|e| ToolError::Network(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(HttpConfig::default().timeout_secs, 30);
    }

    #[test]
    fn test_random_user_agent() {
        assert!(random_user_agent().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_create_client() {
        assert!(create_http_client(&HttpConfig::default()).is_ok());
    }
}
