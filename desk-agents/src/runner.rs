//! Default agent runner: a fresh tool-calling agent per request

use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use desk_core::Credentials;
use desk_tools::Toolbox;

use crate::{Agent, AgentRunner, FragmentStream, PersonaConfig, SharedBackend, DEFAULT_MAX_TOOL_ROUNDS};

/// Runs personas through a shared backend with their configured tools
pub struct ToolAgentRunner {
    backend: SharedBackend,
    credentials: Arc<Credentials>,
    http_client: Client,
    max_tool_rounds: usize,
}

impl ToolAgentRunner {
    pub fn new(backend: SharedBackend, credentials: Arc<Credentials>, http_client: Client) -> Self {
        Self {
            backend,
            credentials,
            http_client,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Build the agent for one request
    pub fn build_agent(&self, persona: &PersonaConfig) -> Agent {
        let toolbox = Toolbox::for_kinds(&persona.tools, &self.credentials, &self.http_client);
        debug!("Built {} with {} tools", persona.name, toolbox.len());

        Agent::new(persona.clone(), self.backend.clone(), toolbox)
            .with_max_tool_rounds(self.max_tool_rounds)
    }
}

impl AgentRunner for ToolAgentRunner {
    fn run(&self, persona: &PersonaConfig, request: &str) -> FragmentStream {
        self.build_agent(persona).run_stream(request)
    }
}
