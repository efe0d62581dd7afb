//! The fixed set of agent personas

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the four preset agent personas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    /// General web search with cited sources
    #[default]
    Web,
    /// Market data and company news for one named company
    Finance,
    /// Book discovery through semantic search
    BookRecommendation,
    /// Product recommendations scraped from trusted shops
    ShoppingPartner,
}

impl Persona {
    /// All personas, in the order they are offered to the user
    pub const ALL: [Persona; 4] = [
        Persona::Web,
        Persona::Finance,
        Persona::BookRecommendation,
        Persona::ShoppingPartner,
    ];

    /// Stable identifier used in forms, flags and persona definitions
    pub fn id(&self) -> &'static str {
        match self {
            Persona::Web => "web",
            Persona::Finance => "finance",
            Persona::BookRecommendation => "book_recommendation",
            Persona::ShoppingPartner => "shopping_partner",
        }
    }

    /// Human-readable label shown on the selector
    pub fn label(&self) -> &'static str {
        match self {
            Persona::Web => "Web Agent",
            Persona::Finance => "Finance Agent",
            Persona::BookRecommendation => "Book Recommendation Agent",
            Persona::ShoppingPartner => "Shopping Partner Agent",
        }
    }

    /// Prompt shown above the free-text query field
    pub fn query_label(&self) -> &'static str {
        match self {
            Persona::Web => "Enter search query:",
            Persona::Finance => "Enter financial analysis questions:",
            Persona::BookRecommendation => "Enter your book preferences or interests:",
            Persona::ShoppingPartner => "Enter your shopping preferences:",
        }
    }

    /// Whether a company name must accompany the query
    pub fn requires_company(&self) -> bool {
        matches!(self, Persona::Finance)
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error parsing a persona selector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown persona '{0}' (expected one of: web, finance, book_recommendation, shopping_partner)")]
pub struct ParsePersonaError(pub String);

impl FromStr for Persona {
    type Err = ParsePersonaError;

    /// Accepts the identifier, the label, or the identifier with dashes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Persona::ALL
            .into_iter()
            .find(|p| p.id() == normalized || p.label().to_lowercase() == s.trim().to_lowercase())
            .ok_or_else(|| ParsePersonaError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_id_and_label() {
        assert_eq!("finance".parse::<Persona>().unwrap(), Persona::Finance);
        assert_eq!("book-recommendation".parse::<Persona>().unwrap(), Persona::BookRecommendation);
        assert_eq!("Shopping Partner Agent".parse::<Persona>().unwrap(), Persona::ShoppingPartner);
        assert!("weather".parse::<Persona>().is_err());
    }

    #[test]
    fn test_only_finance_requires_company() {
        let requiring: Vec<_> = Persona::ALL.iter().filter(|p| p.requires_company()).collect();
        assert_eq!(requiring, vec![&Persona::Finance]);
    }

    #[test]
    fn test_serde_uses_ids() {
        let json = serde_json::to_string(&Persona::ShoppingPartner).unwrap();
        assert_eq!(json, "\"shopping_partner\"");

        let parsed: Persona = serde_json::from_str("\"book_recommendation\"").unwrap();
        assert_eq!(parsed, Persona::BookRecommendation);
    }
}
