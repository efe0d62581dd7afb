//! Startup configuration
//!
//! Everything that can fail before the first request is resolved here:
//! credentials, persona definitions, the model backend and the tool client.
//! Any failure stops the process before a surface is served.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use desk_agents::{
    create_anthropic_backend, create_backend, AnthropicConfig, OpenAIBackendConfig,
    PersonaRegistry, SharedBackend, ToolAgentRunner,
};
use desk_core::{ConfigError, Credentials};
use desk_runtime::Dispatcher;
use desk_tools::{create_http_client, HttpConfig};

/// Model used when an OpenAI-compatible backend is chosen without `--model`
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Args, Clone, Default)]
pub struct BackendArgs {
    /// LLM model for every persona (defaults to each persona's own model)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    pub anthropic_key: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// OpenRouter API key (or set OPENROUTER_API_KEY env var)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    pub openrouter_key: Option<String>,

    /// Use OpenAI instead of Anthropic
    #[arg(long, global = true)]
    pub openai: bool,

    /// Use OpenRouter instead of Anthropic
    #[arg(long, global = true)]
    pub openrouter: bool,

    /// Use a local OpenAI-compatible server at this base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Firecrawl API key for the shopping partner's scraping tool
    #[arg(long, env = "FIRECRAWL_API_KEY", hide_env_values = true, global = true)]
    pub firecrawl_key: Option<String>,

    /// Exa API key for the book recommender's search tool
    #[arg(long, env = "EXA_TOOLS_API_KEY", hide_env_values = true, global = true)]
    pub exa_key: Option<String>,

    /// Timeout for each tool request in seconds
    #[arg(long, default_value = "30", global = true)]
    pub tool_timeout: u64,
}

impl BackendArgs {
    fn provider(&self) -> &'static str {
        if self.base_url.is_some() {
            "local"
        } else if self.openrouter {
            "OpenRouter"
        } else if self.openai {
            "OpenAI"
        } else {
            "Anthropic"
        }
    }

    fn uses_openai_protocol(&self) -> bool {
        self.base_url.is_some() || self.openrouter || self.openai
    }
}

/// Build the dispatcher, or fail with a startup configuration error
pub fn build_dispatcher(args: &BackendArgs) -> Result<Dispatcher> {
    // Credentials first: nothing else matters without them
    let credentials = Credentials::new(args.firecrawl_key.clone(), args.exa_key.clone())?;

    let mut registry =
        PersonaRegistry::load_embedded().map_err(|e| ConfigError::Persona(e.to_string()))?;
    match (&args.model, args.uses_openai_protocol()) {
        (Some(model), _) => registry = registry.with_model(model),
        (None, true) => registry = registry.with_model(DEFAULT_OPENAI_MODEL),
        (None, false) => {}
    }

    let backend = create_llm_backend(args)?;
    let http_client = create_http_client(&HttpConfig {
        timeout_secs: args.tool_timeout,
    })
    .map_err(|e| ConfigError::Backend(e.to_string()))?;

    info!(
        "Provider: {} | Models: {}",
        args.provider(),
        registry.iter().map(|p| p.model.as_str()).collect::<Vec<_>>().join(", ")
    );

    let runner = ToolAgentRunner::new(backend, Arc::new(credentials), http_client);
    Ok(Dispatcher::new(Arc::new(registry), Arc::new(runner)))
}

fn create_llm_backend(args: &BackendArgs) -> Result<SharedBackend, ConfigError> {
    let backend = if let Some(base_url) = &args.base_url {
        create_backend(OpenAIBackendConfig::local(base_url))
    } else if args.openrouter {
        let key = args.openrouter_key.as_deref().ok_or(ConfigError::MissingCredential("OPENROUTER_API_KEY"))?;
        create_backend(OpenAIBackendConfig::openrouter(key))
    } else if args.openai {
        let key = args.api_key.as_deref().ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))?;
        create_backend(OpenAIBackendConfig::openai(key))
    } else {
        // Default: Anthropic
        let key = args
            .anthropic_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("ANTHROPIC_API_KEY"))?;
        create_anthropic_backend(AnthropicConfig::new(key))
    };

    backend.map_err(|e| ConfigError::Backend(e.to_string()))
}
