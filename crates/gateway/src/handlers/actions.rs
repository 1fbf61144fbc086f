//! Navigation and login handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::state::AppState;
use linguachat_common::{
    errors::{AppError, Result},
    view::{Nav, ViewDescriptor},
    Action, Outcome,
};

/// Client action request
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    GetStarted,
    Back,
    Login,
    Navigate { page: String },
    Logout,
    ClearChat,
}

impl ActionRequest {
    fn into_action(self) -> Result<Action> {
        Ok(match self {
            ActionRequest::GetStarted => Action::GetStarted,
            ActionRequest::Back => Action::Back,
            ActionRequest::Login => Action::Login,
            ActionRequest::Navigate { page } => {
                let nav: Nav = page.parse().map_err(|message| AppError::Validation {
                    message,
                    field: Some("page".to_string()),
                })?;
                Action::Navigate(nav)
            }
            ActionRequest::Logout => Action::Logout,
            ActionRequest::ClearChat => Action::ClearChat,
        })
    }
}

/// Login callback request carrying the provider's ID token
#[derive(Debug, Deserialize, Validate)]
pub struct LoginCallbackRequest {
    #[validate(length(min = 1))]
    pub id_token: String,
}

/// Action response
#[derive(Serialize)]
pub struct ActionResponse {
    pub view: ViewDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl From<Outcome> for ActionResponse {
    fn from(outcome: Outcome) -> Self {
        Self {
            view: outcome.view,
            redirect_url: outcome.redirect_url,
        }
    }
}

/// Apply a navigation action
pub async fn apply_action(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>> {
    let action = request.into_action()?;

    tracing::debug!(session_id = %session_id, action = ?action, "Applying action");

    let outcome = state.dispatch(session_id, action).await?;
    Ok(Json(outcome.into()))
}

/// Complete the login redirect
pub async fn login_callback(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<LoginCallbackRequest>,
) -> Result<Json<ActionResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("id_token".to_string()),
    })?;

    let outcome = state
        .dispatch(session_id, Action::LoginCallback(request.id_token))
        .await?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        let request: ActionRequest = serde_json::from_str(r#"{"action":"get_started"}"#).unwrap();
        assert_eq!(request.into_action().unwrap(), Action::GetStarted);

        let request: ActionRequest =
            serde_json::from_str(r#"{"action":"navigate","page":"Admin Dashboard"}"#).unwrap();
        assert_eq!(
            request.into_action().unwrap(),
            Action::Navigate(Nav::AdminDashboard)
        );
    }

    #[test]
    fn test_unknown_page_rejected() {
        let request: ActionRequest =
            serde_json::from_str(r#"{"action":"navigate","page":"settings"}"#).unwrap();
        assert!(matches!(
            request.into_action(),
            Err(AppError::Validation { .. })
        ));
    }
}
