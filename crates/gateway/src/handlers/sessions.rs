//! Session management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;
use linguachat_common::{errors::Result, view::ViewDescriptor};

/// Create session response
#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub view: ViewDescriptor,
}

/// Open a new anonymous session on the Home screen
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>)> {
    let handle = state.open_session().await;
    let mut session = handle.lock().await;
    let view = state.service.present(&mut session);

    tracing::info!(session_id = %session.id(), "Session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id(),
            view,
        }),
    ))
}

/// Render the current screen
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ViewDescriptor>> {
    let handle = state.session(session_id).await?;
    let mut session = handle.lock().await;

    Ok(Json(state.service.present(&mut session)))
}

/// Client disconnected: record usage and drop the session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    let handle = state.session(session_id).await?;
    {
        let mut session = handle.lock().await;
        state.service.logout(&mut session).await;
    }
    state.sessions.remove(session_id);

    tracing::info!(session_id = %session_id, "Session closed");

    Ok(StatusCode::NO_CONTENT)
}
