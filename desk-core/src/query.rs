//! Query construction and validation
//!
//! A [`Query`] is built once per submission from the selected persona, the
//! optional company name and the free-text query. Finance queries are
//! prefixed with a fixed task description naming the company.

use serde::Serialize;
use thiserror::Error;

use crate::Persona;

/// User input failed a precondition; the request is never dispatched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing company name")]
    MissingCompanyName,
}

/// A validated request for one persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub persona: Persona,
    pub free_text: String,
    /// Task description derived from the company name (Finance only)
    pub task_prefix: Option<String>,
}

/// Task description sent ahead of every Finance query
pub fn financial_task_description(company: &str) -> String {
    format!(
        "Retrieve comprehensive financial details for {company}. \
         Include stock prices, analyst recommendations, company information, \
         and the latest financial news. \
         Ensure up-to-date, cited data restricted to the current/most-recent reporting year."
    )
}

/// Build a query for `persona`
///
/// `company` is only consulted for personas that require it and is ignored
/// otherwise.
pub fn build_query(persona: Persona, company: &str, free_text: &str) -> Result<Query, ValidationError> {
    let task_prefix = if persona.requires_company() {
        let company = company.trim();
        if company.is_empty() {
            return Err(ValidationError::MissingCompanyName);
        }
        Some(financial_task_description(company))
    } else {
        None
    };

    Ok(Query {
        persona,
        free_text: free_text.to_string(),
        task_prefix,
    })
}

impl Query {
    /// Text sent to the agent: the task prefix, then the free-text query on
    /// its own line when there is one
    pub fn request_text(&self) -> String {
        match &self.task_prefix {
            Some(prefix) if self.free_text.trim().is_empty() => prefix.clone(),
            Some(prefix) => format!("{}\n{}", prefix, self.free_text),
            None => self.free_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_personas_build_non_empty_requests() {
        for persona in Persona::ALL {
            let query = build_query(persona, "Acme Corp", "what should I know?").unwrap();
            let text = query.request_text();
            assert!(!text.is_empty());
            assert_eq!(query.persona, persona);
            assert!(text.ends_with("what should I know?"));
            assert_eq!(text.contains("Acme Corp"), persona == Persona::Finance);
        }
    }

    #[test]
    fn test_finance_requires_company() {
        assert_eq!(
            build_query(Persona::Finance, "", "anything"),
            Err(ValidationError::MissingCompanyName)
        );
        assert_eq!(
            build_query(Persona::Finance, "   ", "anything"),
            Err(ValidationError::MissingCompanyName)
        );
        assert_eq!(ValidationError::MissingCompanyName.to_string(), "missing company name");
    }

    #[test]
    fn test_finance_without_free_text_uses_prefix_only() {
        let query = build_query(Persona::Finance, "Acme Corp", "").unwrap();
        let text = query.request_text();
        assert!(text.starts_with("Retrieve comprehensive financial details for Acme Corp."));
        assert_eq!(text, financial_task_description("Acme Corp"));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_finance_with_free_text_appends_on_new_line() {
        let query = build_query(Persona::Finance, " Acme Corp ", "Is it a buy?").unwrap();
        assert_eq!(
            query.request_text(),
            format!("{}\nIs it a buy?", financial_task_description("Acme Corp"))
        );
    }

    #[test]
    fn test_non_finance_ignores_company() {
        let query = build_query(Persona::Web, "ignored company", "latest AI news").unwrap();
        assert_eq!(query.request_text(), "latest AI news");
        assert!(query.task_prefix.is_none());
    }

    #[test]
    fn test_non_finance_empty_query_is_allowed() {
        let query = build_query(Persona::ShoppingPartner, "", "").unwrap();
        assert_eq!(query.request_text(), "");
    }
}
