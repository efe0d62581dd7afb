//! Dispatcher
//!
//! Selects the persona configuration for a query, starts a streamed run and
//! aggregates the fragments:
//! - not started -> streaming -> complete | failed
//! - no state survives between dispatches
//! - nothing is retried

use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use desk_agents::{AgentRunner, PersonaRegistry};
use desk_core::{build_query, Persona, Query, ResponseDocument, ValidationError};

/// A run failed before its stream completed
///
/// The fragments received before the failure are kept for diagnostics only;
/// they are never presented as an answer.
#[derive(Debug, Error)]
#[error("Error while processing the response: {message}")]
pub struct ExecutionError {
    pub message: String,
    pub partial: ResponseDocument,
}

/// Sends queries to their persona and aggregates the streamed reply
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<PersonaRegistry>,
    runner: Arc<dyn AgentRunner>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PersonaRegistry>, runner: Arc<dyn AgentRunner>) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// Validate user input into a query
    pub fn build_query(
        &self,
        persona: Persona,
        company: &str,
        free_text: &str,
    ) -> Result<Query, ValidationError> {
        build_query(persona, company, free_text)
    }

    /// Dispatch a query and return the complete document
    pub async fn dispatch(&self, query: &Query) -> Result<ResponseDocument, ExecutionError> {
        self.dispatch_observed(query, |_| {}).await
    }

    /// Dispatch a query, calling `on_fragment` as each fragment arrives
    pub async fn dispatch_observed<F>(
        &self,
        query: &Query,
        mut on_fragment: F,
    ) -> Result<ResponseDocument, ExecutionError>
    where
        F: FnMut(&str) + Send,
    {
        let request_id = Uuid::new_v4();
        let span = info_span!("dispatch", id = %request_id, persona = query.persona.id());

        async move {
            let persona = self.registry.get(query.persona);
            let request = query.request_text();
            let started = Instant::now();

            info!("Dispatching to {} ({} chars)", persona.name, request.len());

            let mut fragments = self.runner.run(persona, &request);
            let mut document = ResponseDocument::new();

            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        debug!("Fragment: {} bytes", fragment.content.len());
                        on_fragment(&fragment.content);
                        document.push(fragment.content);
                    }
                    Err(e) => {
                        error!(
                            "Dispatch failed after {} fragments ({} bytes): {}",
                            document.fragments().len(),
                            document.len(),
                            e
                        );
                        return Err(ExecutionError {
                            message: e.to_string(),
                            partial: document,
                        });
                    }
                }
            }

            info!(
                "Dispatch complete: {} fragments, {} bytes in {:.1}s",
                document.fragments().len(),
                document.len(),
                started.elapsed().as_secs_f64()
            );
            Ok(document)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_agents::{AgentError, FragmentStream, LlmError, PersonaConfig, RunResponse};
    use futures::stream;
    use std::sync::Mutex;

    /// Yields fixed fragments, optionally followed by an error
    struct FixedRunner {
        fragments: Vec<&'static str>,
        fail_after: bool,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FixedRunner {
        fn new(fragments: Vec<&'static str>, fail_after: bool) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                fail_after,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl AgentRunner for FixedRunner {
        fn run(&self, persona: &PersonaConfig, request: &str) -> FragmentStream {
            self.seen
                .lock()
                .unwrap()
                .push((persona.name.clone(), request.to_string()));

            let mut items: Vec<Result<RunResponse, AgentError>> =
                self.fragments.iter().map(|f| Ok(RunResponse::new(*f))).collect();
            if self.fail_after {
                items.push(Err(AgentError::Llm(LlmError::Network("connection reset".to_string()))));
            }
            stream::iter(items).boxed()
        }
    }

    fn dispatcher(runner: Arc<FixedRunner>) -> Dispatcher {
        let registry = PersonaRegistry::load_embedded().unwrap();
        Dispatcher::new(Arc::new(registry), runner)
    }

    #[tokio::test]
    async fn test_fragments_aggregate_in_order() {
        let runner = FixedRunner::new(vec!["Hel", "lo, ", "world"], false);
        let dispatcher = dispatcher(runner);

        let query = dispatcher.build_query(Persona::Web, "", "greet me").unwrap();
        let document = dispatcher.dispatch(&query).await.unwrap();

        assert_eq!(document.text(), "Hello, world");
    }

    #[tokio::test]
    async fn test_failure_after_partial_output() {
        let runner = FixedRunner::new(vec!["partial"], true);
        let dispatcher = dispatcher(runner);

        let query = dispatcher.build_query(Persona::BookRecommendation, "", "sci-fi").unwrap();
        let err = dispatcher.dispatch(&query).await.unwrap_err();

        assert!(err.message.contains("connection reset"));
        assert_eq!(err.partial.text(), "partial");
        assert!(err.to_string().starts_with("Error while processing the response:"));
    }

    #[tokio::test]
    async fn test_request_reaches_selected_persona() {
        let runner = FixedRunner::new(vec!["ok"], false);
        let dispatcher = dispatcher(runner.clone());

        let query = dispatcher.build_query(Persona::Finance, "Acme Corp", "Is it a buy?").unwrap();
        dispatcher.dispatch(&query).await.unwrap();

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Finance Agent");
        assert!(seen[0].1.starts_with("Retrieve comprehensive financial details for Acme Corp."));
        assert!(seen[0].1.ends_with("\nIs it a buy?"));
    }

    #[tokio::test]
    async fn test_observer_sees_each_fragment() {
        let runner = FixedRunner::new(vec!["a", "b", "c"], false);
        let dispatcher = dispatcher(runner);
        let query = dispatcher.build_query(Persona::ShoppingPartner, "", "shoes").unwrap();

        let mut observed = Vec::new();
        let document = dispatcher
            .dispatch_observed(&query, |f| observed.push(f.to_string()))
            .await
            .unwrap();

        assert_eq!(observed, vec!["a", "b", "c"]);
        assert_eq!(document.text(), "abc");
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_document() {
        let runner = FixedRunner::new(vec![], false);
        let dispatcher = dispatcher(runner);
        let query = dispatcher.build_query(Persona::Web, "", "").unwrap();

        let document = dispatcher.dispatch(&query).await.unwrap();
        assert!(document.is_empty());
    }

    #[tokio::test]
    async fn test_dispatches_are_independent() {
        let runner = FixedRunner::new(vec!["same"], false);
        let dispatcher = dispatcher(runner.clone());
        let query = dispatcher.build_query(Persona::Web, "", "q").unwrap();

        let first = dispatcher.dispatch(&query).await.unwrap();
        let second = dispatcher.dispatch(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(runner.seen.lock().unwrap().len(), 2);
    }
}
