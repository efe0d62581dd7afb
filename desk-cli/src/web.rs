//! HTTP surface for the query form

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    response::Html,
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use desk_core::Persona;
use desk_runtime::Dispatcher;

use crate::page::{render_page, Outcome, PageView};

/// Shared server state
pub struct AppState {
    pub dispatcher: Dispatcher,
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexParams {
    pub persona: Option<Persona>,
}

/// Submitted form fields
#[derive(Debug, Deserialize)]
pub struct AskForm {
    pub persona: Persona,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub query: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the server
pub async fn serve(dispatcher: Dispatcher, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(Arc::new(AppState { dispatcher }));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(Query(params): Query<IndexParams>) -> Html<String> {
    Html(render_page(&PageView {
        selected: params.persona.unwrap_or_default(),
        ..Default::default()
    }))
}

async fn ask(State(state): State<Arc<AppState>>, Form(form): Form<AskForm>) -> Html<String> {
    let mut view = PageView {
        selected: form.persona,
        company: form.company,
        query: form.query,
        outcome: None,
    };

    let query = match state
        .dispatcher
        .build_query(view.selected, &view.company, &view.query)
    {
        Ok(query) => query,
        Err(e) => {
            warn!("Rejected {} query: {}", view.selected.id(), e);
            view.outcome = Some(Outcome::Error("Please enter a valid company name!".to_string()));
            return Html(render_page(&view));
        }
    };

    view.outcome = Some(match state.dispatcher.dispatch(&query).await {
        Ok(document) => Outcome::Answer(document.text()),
        Err(e) => Outcome::Error(e.to_string()),
    });

    Html(render_page(&view))
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    use desk_agents::{
        AgentError, AgentRunner, FragmentStream, LlmError, PersonaConfig, PersonaRegistry,
        RunResponse,
    };

    /// Replies with fixed markdown, or fails after a partial fragment
    struct StubRunner {
        fail: bool,
        calls: AtomicUsize,
    }

    impl AgentRunner for StubRunner {
        fn run(&self, _persona: &PersonaConfig, _request: &str) -> FragmentStream {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items = if self.fail {
                vec![
                    Ok(RunResponse::new("half an ans")),
                    Err(AgentError::Llm(LlmError::Api("rate limited".to_string()))),
                ]
            } else {
                vec![Ok(RunResponse::new("## Top ")), Ok(RunResponse::new("picks\n\n- *Dune*"))]
            };
            stream::iter(items).boxed()
        }
    }

    fn app(fail: bool) -> (Router, Arc<StubRunner>) {
        let runner = Arc::new(StubRunner {
            fail,
            calls: AtomicUsize::new(0),
        });
        let registry = PersonaRegistry::load_embedded().unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry), runner.clone());
        (router(Arc::new(AppState { dispatcher })), runner)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_form(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ask")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_offers_all_personas() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let page = body_text(response).await;
        for persona in Persona::ALL {
            assert!(page.contains(persona.label()));
        }
        assert!(page.contains("id=\"company-field\" class=\"field hidden\""));
        assert!(page.contains("Enter search query:"));
        assert!(page.contains("Ask Agent"));
    }

    #[tokio::test]
    async fn test_finance_shows_company_field() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::builder().uri("/?persona=finance").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let page = body_text(response).await;
        assert!(page.contains("id=\"company-field\" class=\"field\""));
        assert!(page.contains("Enter financial analysis questions:"));
    }

    #[tokio::test]
    async fn test_blank_company_never_dispatches() {
        let (app, runner) = app(false);
        let response = app
            .oneshot(post_form("persona=finance&company=+++&query=outlook"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let page = body_text(response).await;
        assert!(page.contains("Please enter a valid company name!"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_answer_is_rendered_as_markdown() {
        let (app, runner) = app(false);
        let response = app
            .oneshot(post_form("persona=book_recommendation&query=space+opera"))
            .await
            .unwrap();

        let page = body_text(response).await;
        assert!(page.contains("<h2>Top picks</h2>"));
        assert!(page.contains("<em>Dune</em>"));
        assert!(page.contains(">space opera</textarea>"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_shows_error_without_partial_answer() {
        let (app, _) = app(true);
        let response = app
            .oneshot(post_form("persona=web&query=news"))
            .await
            .unwrap();

        let page = body_text(response).await;
        assert!(page.contains("Error while processing the response:"));
        assert!(page.contains("rate limited"));
        assert!(!page.contains("half an ans"));
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "ok");
    }
}
