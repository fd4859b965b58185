//! HTTP intake: health probe and the webhook endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::events::WebhookEnvelope;

/// Shared state for the intake routes.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the intake router.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/events", post(receive_event))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// GET / liveness probe.
async fn health() -> &'static str {
    "lens-relay is running"
}

/// POST /events: one webhook delivery.
///
/// Well-formed deliveries are always acknowledged with 200 and either the
/// literal verification challenge or a short status token; an error status
/// here would only provoke the platform into more retries. Malformed JSON
/// is the one non-2xx, produced by the extractor's rejection.
async fn receive_event(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Response {
    match state.dispatcher.dispatch(&envelope).await {
        DispatchOutcome::Challenge(challenge) => (StatusCode::OK, challenge).into_response(),
        other => (StatusCode::OK, status_token(&other)).into_response(),
    }
}

/// Short acknowledgment token for non-challenge outcomes. The processing
/// result is never observable here, only through the eventual reply.
fn status_token(outcome: &DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::Challenge(_) | DispatchOutcome::Accepted => "ok",
        DispatchOutcome::Command => "command",
        DispatchOutcome::Duplicate => "duplicate",
        DispatchOutcome::CredentialMissing => "no_credential",
        DispatchOutcome::Ignored => "ignored",
        DispatchOutcome::Busy => "busy",
    }
}
