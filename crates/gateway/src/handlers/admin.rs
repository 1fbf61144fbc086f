//! Admin dashboard handlers

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::state::AppState;
use linguachat_common::{
    admin::AdminOverview,
    errors::{AppError, Result},
};

/// Users joined with their last-session usage, plus totals
pub async fn get_overview(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AdminOverview>> {
    let handle = state.session(session_id).await?;
    let mut session = handle.lock().await;

    Ok(Json(state.service.admin_overview(&mut session).await?))
}

/// Download the report as CSV
pub async fn export_csv(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let handle = state.session(session_id).await?;
    let mut session = handle.lock().await;

    let report = match state.service.admin_overview(&mut session).await? {
        AdminOverview::Available(report) => report,
        AdminOverview::Unavailable { reason } => {
            return Err(AppError::ServiceUnavailable { message: reason });
        }
    };

    tracing::info!(
        session_id = %session_id,
        rows = report.rows.len(),
        "Admin report exported"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"user_usage_data.csv\"",
            ),
        ],
        report.to_csv()?,
    ))
}
