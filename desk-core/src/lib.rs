//! Agent Desk Core - domain model for persona-driven agent requests
//!
//! This crate provides the foundational types:
//! - The closed set of agent personas and the tools they may use
//! - Query construction and validation
//! - Aggregated response documents
//! - Startup credentials

pub mod credentials;
pub mod document;
pub mod persona;
pub mod query;
pub mod tools;

pub use credentials::*;
pub use document::*;
pub use persona::*;
pub use query::*;
pub use tools::*;

/// Environment variable holding the content-scraping credential
pub const FIRECRAWL_API_KEY_VAR: &str = "FIRECRAWL_API_KEY";

/// Environment variable holding the semantic-search credential
pub const EXA_TOOLS_API_KEY_VAR: &str = "EXA_TOOLS_API_KEY";
