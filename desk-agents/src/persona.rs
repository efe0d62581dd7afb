//! Persona definitions
//!
//! Each persona is a TOML document under `prompts/`, embedded at compile time
//! and parsed once at startup. The registry holds exactly one configuration
//! per [`Persona`], so lookups are total.

use serde::Deserialize;
use thiserror::Error;

use desk_core::{Persona, ToolKind};

/// Errors loading persona definitions
#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("Failed to parse persona definition: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Persona '{0}' is defined more than once")]
    Duplicate(&'static str),

    #[error("Persona '{0}' has no definition")]
    Missing(&'static str),
}

/// A persona definition as written in TOML
#[derive(Debug, Clone, Deserialize)]
struct PersonaFile {
    persona: PersonaMetadata,
    #[serde(default)]
    tools: ToolsSection,
    prompt: PromptSection,
}

#[derive(Debug, Clone, Deserialize)]
struct PersonaMetadata {
    id: Persona,
    name: String,
    #[serde(default)]
    description: String,
    model: String,
    #[serde(default)]
    history: bool,
    #[serde(default = "default_markdown")]
    markdown: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ToolsSection {
    #[serde(default)]
    enabled: Vec<ToolKind>,
}

#[derive(Debug, Clone, Deserialize)]
struct PromptSection {
    #[serde(default)]
    instructions: Vec<String>,
}

fn default_markdown() -> bool {
    true
}

/// Immutable configuration of one persona
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaConfig {
    pub kind: Persona,
    pub name: String,
    pub description: String,
    /// Backend model identifier
    pub model: String,
    pub tools: Vec<ToolKind>,
    pub instructions: Vec<String>,
    /// Carry earlier runs of the same agent into later ones
    pub history_enabled: bool,
    /// Ask the model to answer in markdown
    pub markdown: bool,
}

impl From<PersonaFile> for PersonaConfig {
    fn from(file: PersonaFile) -> Self {
        let mut tools = file.tools.enabled;
        tools.dedup();

        Self {
            kind: file.persona.id,
            name: file.persona.name,
            description: file.persona.description,
            model: file.persona.model,
            tools,
            instructions: file.prompt.instructions,
            history_enabled: file.persona.history,
            markdown: file.persona.markdown,
        }
    }
}

impl PersonaConfig {
    /// Parse a single TOML definition
    pub fn from_toml(toml_str: &str) -> Result<Self, PersonaError> {
        let file: PersonaFile = toml::from_str(toml_str)?;
        Ok(file.into())
    }

    /// Assemble the system prompt sent with every turn
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.", self.name);
        if !self.description.is_empty() {
            prompt.push(' ');
            prompt.push_str(&self.description);
        }

        let mut instructions: Vec<&str> = self.instructions.iter().map(String::as_str).collect();
        if self.markdown {
            instructions.push("Use markdown to format your answers.");
        }

        if !instructions.is_empty() {
            prompt.push_str("\n\n## Instructions\n");
            for line in instructions {
                prompt.push_str("- ");
                prompt.push_str(line);
                prompt.push('\n');
            }
        }

        prompt
    }
}

/// The four persona configurations, one per [`Persona`]
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    web: PersonaConfig,
    finance: PersonaConfig,
    book_recommendation: PersonaConfig,
    shopping_partner: PersonaConfig,
}

impl PersonaRegistry {
    /// Load the persona definitions compiled into the binary
    pub fn load_embedded() -> Result<Self, PersonaError> {
        Self::from_definitions(&[
            include_str!("../prompts/web.toml"),
            include_str!("../prompts/finance.toml"),
            include_str!("../prompts/book_recommendation.toml"),
            include_str!("../prompts/shopping_partner.toml"),
        ])
    }

    /// Build from TOML definitions covering every persona exactly once
    pub fn from_definitions(definitions: &[&str]) -> Result<Self, PersonaError> {
        let mut slots: [Option<PersonaConfig>; 4] = Default::default();

        for toml_str in definitions {
            let config = PersonaConfig::from_toml(toml_str)?;
            let slot = &mut slots[slot_index(config.kind)];
            if slot.is_some() {
                return Err(PersonaError::Duplicate(config.kind.id()));
            }
            *slot = Some(config);
        }

        let [web, finance, book_recommendation, shopping_partner] = slots;
        let take = |slot: Option<PersonaConfig>, persona: Persona| {
            slot.ok_or(PersonaError::Missing(persona.id()))
        };

        Ok(Self {
            web: take(web, Persona::Web)?,
            finance: take(finance, Persona::Finance)?,
            book_recommendation: take(book_recommendation, Persona::BookRecommendation)?,
            shopping_partner: take(shopping_partner, Persona::ShoppingPartner)?,
        })
    }

    /// Configuration for a persona
    pub fn get(&self, persona: Persona) -> &PersonaConfig {
        match persona {
            Persona::Web => &self.web,
            Persona::Finance => &self.finance,
            Persona::BookRecommendation => &self.book_recommendation,
            Persona::ShoppingPartner => &self.shopping_partner,
        }
    }

    /// Use `model` for every persona
    pub fn with_model(mut self, model: &str) -> Self {
        for persona in Persona::ALL {
            self.get_mut(persona).model = model.to_string();
        }
        self
    }

    /// All configurations, in selector order
    pub fn iter(&self) -> impl Iterator<Item = &PersonaConfig> {
        Persona::ALL.into_iter().map(|p| self.get(p))
    }

    fn get_mut(&mut self, persona: Persona) -> &mut PersonaConfig {
        match persona {
            Persona::Web => &mut self.web,
            Persona::Finance => &mut self.finance,
            Persona::BookRecommendation => &mut self.book_recommendation,
            Persona::ShoppingPartner => &mut self.shopping_partner,
        }
    }
}

fn slot_index(persona: Persona) -> usize {
    match persona {
        Persona::Web => 0,
        Persona::Finance => 1,
        Persona::BookRecommendation => 2,
        Persona::ShoppingPartner => 3,
    }
}
