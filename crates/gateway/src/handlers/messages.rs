//! Chat message handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::actions::ActionResponse;
use crate::state::AppState;
use linguachat_common::{
    errors::{AppError, Result},
    Action,
};

/// Submit message request
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitMessageRequest {
    #[validate(length(min = 1, max = 8000, message = "Message must be 1-8000 characters"))]
    pub text: String,
}

/// Submit one user message and return the updated chat
pub async fn submit_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SubmitMessageRequest>,
) -> Result<Json<ActionResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("text".to_string()),
    })?;

    let outcome = state
        .dispatch(session_id, Action::SubmitMessage(request.text))
        .await?;

    tracing::debug!(
        session_id = %session_id,
        turns = outcome.view.conversation.len(),
        "Message processed"
    );

    Ok(Json(outcome.into()))
}
