//! The agent execution contract
//!
//! Callers hand a persona and request text to an [`AgentRunner`] and pull
//! response fragments from the returned stream until it ends or yields an
//! error. The stream is finite and cannot be restarted.

use futures::stream::BoxStream;
use thiserror::Error;

use crate::{LlmError, PersonaConfig};

/// Errors from agent runs
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool loop exceeded {0} rounds")]
    ToolLoop(usize),

    #[error("Run cancelled: response stream dropped")]
    Cancelled,

    #[error("Agent task failed: {0}")]
    Task(String),
}

/// One streamed chunk of an agent's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResponse {
    pub content: String,
}

impl RunResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Lazy, finite sequence of response fragments
pub type FragmentStream = BoxStream<'static, Result<RunResponse, AgentError>>;

/// Runs a persona against a request and streams the answer
pub trait AgentRunner: Send + Sync {
    fn run(&self, persona: &PersonaConfig, request: &str) -> FragmentStream;
}
