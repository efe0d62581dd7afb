//! Process-wide tool credentials
//!
//! Read once at startup and shared immutably for the life of the process.

use thiserror::Error;

use crate::{EXA_TOOLS_API_KEY_VAR, FIRECRAWL_API_KEY_VAR};

/// Fatal startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set. Please set the {0} environment variable.")]
    MissingCredential(&'static str),

    #[error("Invalid persona definition: {0}")]
    Persona(String),

    #[error("Backend configuration error: {0}")]
    Backend(String),
}

/// API keys for the external tools
#[derive(Clone)]
pub struct Credentials {
    /// Content scraping (Firecrawl)
    pub firecrawl_api_key: String,
    /// Semantic search (Exa)
    pub exa_api_key: String,
}

impl Credentials {
    /// Build from optional values, rejecting absent or blank keys
    pub fn new(firecrawl_api_key: Option<String>, exa_api_key: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            firecrawl_api_key: required(FIRECRAWL_API_KEY_VAR, firecrawl_api_key)?,
            exa_api_key: required(EXA_TOOLS_API_KEY_VAR, exa_api_key)?,
        })
    }
}

// Keys never appear in logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("firecrawl_api_key", &"***")
            .field("exa_api_key", &"***")
            .finish()
    }
}

fn required(var: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingCredential(var)),
    }
}
