//! Agent Desk Tools
//!
//! HTTP clients for the external capabilities an agent may call:
//! - **Web search**: DuckDuckGo HTML results
//! - **Market data**: Yahoo Finance quotes, recommendations, profiles and news
//! - **Content scraping**: Firecrawl page scraping
//! - **Semantic search**: Exa neural search
//!
//! Each capability implements [`Tool`]; a [`Toolbox`] bundles the tools
//! configured for one persona.

pub mod client;
pub mod market_data;
pub mod scraping;
pub mod semantic_search;
pub mod toolbox;
pub mod web_search;

pub use client::*;
pub use market_data::*;
pub use scraping::*;
pub use semantic_search::*;
pub use toolbox::*;
pub use web_search::*;
