//! Agent Desk Agents
//!
//! Everything needed to turn a persona and a request into a streamed answer:
//! - **Personas**: embedded TOML definitions, see [`persona::PersonaRegistry`]
//! - **Backends**: Anthropic Messages API and OpenAI-compatible chat
//!   completions, both streamed
//! - **Agent**: the tool-calling loop over a backend and a toolbox
//! - **Runner**: the [`AgentRunner`] contract callers depend on

pub mod agent;
pub mod anthropic;
pub mod backend;
pub mod openai;
pub mod persona;
pub mod runner;
pub mod sse;
pub mod traits;

pub use agent::*;
pub use anthropic::*;
pub use backend::*;
pub use openai::*;
pub use persona::*;
pub use runner::*;
pub use traits::*;
