//! HTTP ingress: the OpenAI-compatible surface in front of the reasoning
//! orchestrator (spec §6). This is ambient plumbing, not core (spec §1):
//! it only translates wire shapes and dispatches into `gateway_core::
//! Orchestrator`.

pub mod dto;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::config::Config;
use crate::error::GatewayError;
use crate::model_client::ModelClient;
use crate::orchestrator::Orchestrator;
use crate::server::dto::{ChatCompletionRequest, ChatCompletionResponse, ErrorBody};
use crate::server::sse::to_sse_response;

/// Shared process-wide state handed to every request handler. One
/// `Orchestrator` (and the `Arc<dyn ModelClient>`/`Arc<Config>` it wraps) is
/// constructed once at startup and cloned cheaply per request (spec §5: one
/// shared connection pool / model client per process).
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Arc<Config>, client: Arc<dyn ModelClient>) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(config.clone(), client));
        Self { orchestrator, config }
    }
}

/// Build the Axum router: the chat-completions endpoint plus a health check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Optional per-request deadline header (spec §4.1, §5): an orchestrator
/// wall-clock budget distinct from any single upstream call's own timeout.
const DEADLINE_HEADER: &str = "x-request-deadline-ms";

fn deadline_from_headers(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(DEADLINE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[tracing::instrument(skip(state, headers, body))]
async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatCompletionRequest>,
) -> Response {
    let request_id = format!("chatcmpl-{}", Uuid::new_v4());
    let stream = body.stream;
    let model_name = body.model.clone().unwrap_or_else(|| state.config.models.main.clone());

    let request = match body.into_core_request() {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    let deadline = deadline_from_headers(&headers);

    if stream {
        match state.orchestrator.run_stream(request, deadline).await {
            Ok(events) => to_sse_response(request_id, model_name, events).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.orchestrator.run(request, deadline).await {
            Ok(answer) => {
                Json(ChatCompletionResponse::from_final_answer(request_id, model_name, answer))
                    .into_response()
            }
            Err(e) => error_response(&e),
        }
    }
}

/// Map a `GatewayError` to an OpenAI-compatible error body and HTTP status
/// (spec §7: only `AllThreadsFailed`, `DeadlineExceeded`, `BadRequest` are
/// ever expected to reach this point; any other variant leaking through is
/// still mapped safely via `status_code`/`user_message`).
fn error_response(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from_gateway_error(err))).into_response()
}
