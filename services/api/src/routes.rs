//! HTTP surface: the assistant webhook, the storage-event hook and a health
//! probe.

use crate::error::ApiError;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use photobooth_core::controller::{DialogueController, Reply};
use photobooth_core::dialogue::Intent;
use photobooth_core::dispatch::CommandQueue;
use photobooth_core::session::{Conversation, DialogueContext, SessionData};
use photobooth_core::uploads::{StorageObject, UploadNotifier, UploadOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Everything the handlers share.
pub struct AppState {
    pub controller: DialogueController,
    pub commands: CommandQueue,
    pub uploads: UploadNotifier,
}

/// One conversational turn as the platform posts it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub session_id: String,
    pub action: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub contexts: Vec<DialogueContext>,
    #[serde(default)]
    pub data: SessionData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub speech: String,
    pub expect_user_response: bool,
    pub contexts: Vec<DialogueContext>,
    pub data: SessionData,
}

impl From<Reply> for WebhookResponse {
    fn from(reply: Reply) -> Self {
        Self {
            expect_user_response: reply.expects_user_response(),
            speech: reply.speech,
            contexts: reply.contexts,
            data: reply.data,
        }
    }
}

/// Envelope of a storage-change notification.
#[derive(Debug, Deserialize)]
pub struct StorageEvent {
    pub data: StorageObject,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/assistant", post(assistant))
        .route("/storage", post(storage))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn assistant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let intent: Intent = request.action.parse()?;
    info!(session = %request.session_id, action = %request.action, "Webhook turn");

    let conversation = Conversation {
        user_id: request.user_id,
        contexts: request.contexts,
        data: request.data,
    };
    let reply = state.controller.handle(intent, &conversation)?;
    debug!(speech = %reply.speech, "Reply rendered");

    for command in &reply.commands {
        state.commands.submit(*command);
    }
    Ok(Json(reply.into()))
}

async fn storage(
    State(state): State<Arc<AppState>>,
    Json(event): Json<StorageEvent>,
) -> Result<Json<UploadOutcome>, ApiError> {
    let outcome = state
        .uploads
        .handle(&event.data)
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(outcome))
}

async fn health() -> &'static str {
    "ok"
}
