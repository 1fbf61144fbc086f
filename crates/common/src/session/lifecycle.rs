//! Session lifecycle operations
//!
//! `ChatService` applies actions to a `Session`: navigation via the pure view
//! reducer, login and logout, message submission and clearing. The gateway
//! serialises actions per session, so every method here takes `&mut Session`.

use super::{Session, Turn};
use crate::admin::{self, AdminOverview};
use crate::chat::{ChatClient, DialogueHandle, DEFAULT_SYSTEM_PROMPT};
use crate::clock::Clock;
use crate::errors::{AppError, Result};
use crate::identity::{AdminPolicy, IdentityKey, IdentityProvider};
use crate::language::{LanguageDetector, LanguageTag};
use crate::usage::UsageRecorder;
use crate::view::{self, AuthStatus, Effect, Nav, RenderContext, ViewAction, ViewDescriptor};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Assistant text used when no chat model is configured
pub const MODEL_UNAVAILABLE_REPLY: &str =
    "The assistant is not configured right now, so this message could not be answered.";

/// Client action applied to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    GetStarted,
    Back,
    Login,
    Navigate(Nav),
    Logout,
    ClearChat,
    SubmitMessage(String),
    LoginCallback(String),
}

/// Result of one dispatched action
#[derive(Debug, Clone)]
pub struct Outcome {
    pub view: ViewDescriptor,
    /// Set when the client should follow the identity provider redirect
    pub redirect_url: Option<String>,
}

/// Applies lifecycle operations to sessions
pub struct ChatService {
    detector: Arc<dyn LanguageDetector>,
    chat: Option<Arc<dyn ChatClient>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    admins: AdminPolicy,
    recorder: UsageRecorder,
    system_prompt: String,
    banner_url: Option<String>,
}

impl ChatService {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        chat: Option<Arc<dyn ChatClient>>,
        identity: Option<Arc<dyn IdentityProvider>>,
        admins: AdminPolicy,
        recorder: UsageRecorder,
    ) -> Self {
        Self {
            detector,
            chat,
            identity,
            admins,
            recorder,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            banner_url: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_banner_url(mut self, url: Option<String>) -> Self {
        self.banner_url = url;
        self
    }

    pub fn chat_available(&self) -> bool {
        self.chat.is_some()
    }

    pub fn login_available(&self) -> bool {
        self.identity.is_some()
    }

    pub fn recorder(&self) -> &UsageRecorder {
        &self.recorder
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.recorder.clock()
    }

    /// Authentication facts for this cycle. Admin status comes from the
    /// verified identity, never from client state.
    pub fn auth_status(&self, session: &Session) -> AuthStatus {
        let is_admin = session.authenticated
            && session
                .identity
                .as_ref()
                .map(|identity| self.admins.is_admin(identity))
                .unwrap_or(false);

        AuthStatus {
            authenticated: session.authenticated,
            is_admin,
        }
    }

    /// Re-verify the stored credential. A credential that no longer verifies
    /// signs the session out; this never fails.
    pub fn refresh_auth(&self, session: &mut Session) {
        let Some(credential) = session.credential.as_deref() else {
            session.authenticated = false;
            return;
        };

        let verified = match &self.identity {
            Some(provider) => provider.verify(credential),
            None => Err(AppError::LoginUnavailable {
                message: "identity provider is not configured".to_string(),
            }),
        };

        match verified {
            Ok(identity) => {
                session.identity = Some(identity);
                session.authenticated = true;
            }
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Stored credential rejected");
                session.authenticated = false;
                session.credential = None;
                session.identity = None;
                session.notice = Some(format!("You have been signed out: {}. Please log in again.", e));
            }
        }
    }

    /// Verify a credential returned by the provider and sign the session in
    pub async fn complete_login(&self, session: &mut Session, credential: &str) -> Result<()> {
        let Some(provider) = self.identity.as_ref() else {
            session.notice = Some("Login is not available right now.".to_string());
            return Err(AppError::LoginUnavailable {
                message: "identity provider is not configured".to_string(),
            });
        };

        let identity = match provider.verify(credential) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Login credential rejected");
                session.notice = Some(format!("Login failed: {}", e));
                return Err(e);
            }
        };

        let key = match identity.resolve_key() {
            IdentityKey::Resolved(key) => key,
            IdentityKey::Unresolvable => {
                warn!(session_id = %session.id(), "Identity has no subject id, login rejected");
                session.notice =
                    Some("Login failed: your account did not provide a stable user id.".to_string());
                return Err(AppError::IdentityUnresolvable);
            }
        };

        // Another account signing in on this tab starts from scratch
        if session.user_key.as_deref().is_some_and(|previous| previous != key) {
            self.logout(session).await;
        }

        let now = self.clock().now();
        if let Some(store) = self.recorder.store() {
            if let Err(e) = store.upsert_user(&key, &identity, now).await {
                warn!(user_key = %key, error = %e, "Failed to save user profile");
            }
        }

        info!(session_id = %session.id(), user_key = %key, "User signed in");

        session.credential = Some(credential.to_string());
        session.identity = Some(identity);
        session.user_key = Some(key);
        session.authenticated = true;
        session.flags.show_login_requested = false;
        session.notice = None;

        self.start_session(session)
    }

    /// Open the dialogue and start the session timer if not already done
    pub fn start_session(&self, session: &mut Session) -> Result<()> {
        if !session.authenticated {
            return Err(AppError::Unauthorized {
                message: "sign in to start chatting".to_string(),
            });
        }

        if session.dialogue.is_none() && self.chat.is_some() {
            session.dialogue = Some(DialogueHandle::new());
        }

        if session.session_start.is_none() {
            session.session_start = Some(self.clock().now());
            session.message_count = 0;
            debug!(session_id = %session.id(), "Session timer started");
        }

        Ok(())
    }

    /// Append a user turn and its reply.
    ///
    /// Model and persistence failures end up in the conversation or the logs;
    /// only an unauthenticated session or empty text is an error.
    ///
    /// The user turn, the reply and the count are committed together once the
    /// model call returns. Dropping the future before then leaves the
    /// conversation and the dialogue history untouched.
    pub async fn submit_message(&self, session: &mut Session, text: &str) -> Result<()> {
        if !session.authenticated {
            return Err(AppError::Unauthorized {
                message: "sign in to send messages".to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(AppError::Validation {
                message: "message must not be empty".to_string(),
                field: Some("text".to_string()),
            });
        }

        self.start_session(session)?;

        let language = LanguageTag::from_detection(self.detector.detect(text));
        crate::metrics::record_detection(language.code().unwrap_or("unknown"));

        let (reply, outcome) = match &self.chat {
            Some(client) => {
                let dialogue = session.dialogue.get_or_insert_with(DialogueHandle::new);
                match dialogue.send(client.as_ref(), text, &self.system_prompt).await {
                    Ok(reply) => (Turn::assistant(reply, language.clone()), "replied"),
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "Model request failed");
                        (Turn::assistant(format!("Error: {}", e), LanguageTag::None), "error")
                    }
                }
            }
            None => (
                Turn::assistant(MODEL_UNAVAILABLE_REPLY, language.clone()),
                "unavailable",
            ),
        };

        session.conversation.push(Turn::user(text, language));
        session.conversation.push(reply);
        session.message_count += 1;
        crate::metrics::record_message(outcome);

        if let (Some(key), Some(start)) = (session.user_key.as_deref(), session.session_start) {
            self.recorder.record(key, start, session.message_count).await;
        }

        Ok(())
    }

    /// Empty the conversation and drop the model dialogue. The session timer
    /// keeps running.
    pub fn clear_conversation(&self, session: &mut Session) {
        session.conversation.clear();
        session.message_count = 0;
        session.dialogue = None;
        debug!(session_id = %session.id(), "Conversation cleared");
    }

    /// Record usage and reset the session to a fresh anonymous one
    pub async fn logout(&self, session: &mut Session) {
        if let (Some(key), Some(start)) = (session.user_key.as_deref(), session.session_start) {
            self.recorder.record(key, start, session.message_count).await;
            info!(session_id = %session.id(), user_key = %key, "User signed out");
        }
        session.reset();
    }

    /// Render the current screen. Consumes the pending notice.
    pub fn present(&self, session: &mut Session) -> ViewDescriptor {
        self.refresh_auth(session);

        let auth = self.auth_status(session);
        let ctx = RenderContext {
            now: self.clock().now(),
            banner_url: self.banner_url.as_deref(),
            chat_available: self.chat_available(),
        };
        let descriptor = view::render(session, auth, &ctx);
        session.notice = None;
        crate::metrics::record_render(descriptor.screen.as_str());

        descriptor
    }

    /// Apply one action and render the result
    pub async fn dispatch(&self, session: &mut Session, action: Action) -> Result<Outcome> {
        self.refresh_auth(session);
        let auth = self.auth_status(session);
        let mut redirect_url = None;

        let view_action = match action {
            Action::GetStarted => Some(ViewAction::GetStarted),
            Action::Back => Some(ViewAction::Back),
            Action::Login => Some(ViewAction::Login),
            Action::Navigate(nav) => Some(ViewAction::Navigate(nav)),
            Action::Logout => Some(ViewAction::Logout),
            Action::ClearChat => {
                if !auth.authenticated {
                    return Err(AppError::Unauthorized {
                        message: "sign in to manage the chat".to_string(),
                    });
                }
                self.clear_conversation(session);
                session.notice = Some("Chat history cleared!".to_string());
                None
            }
            Action::SubmitMessage(text) => {
                self.submit_message(session, &text).await?;
                None
            }
            Action::LoginCallback(credential) => {
                self.complete_login(session, &credential).await?;
                None
            }
        };

        if let Some(view_action) = view_action {
            if let ViewAction::Navigate(nav) = view_action {
                if !auth.is_admin {
                    warn!(session_id = %session.id(), page = ?nav, "Navigation ignored for non-admin");
                }
            }

            let transition = view::reduce(session.flags, auth, view_action);
            session.flags = transition.flags;

            match transition.effect {
                Some(Effect::RedirectToProvider) => {
                    let state = session.id().to_string();
                    redirect_url = self
                        .identity
                        .as_ref()
                        .and_then(|provider| provider.login_url(&state));
                    if redirect_url.is_none() {
                        session.notice = Some("Login is not available right now.".to_string());
                    }
                }
                Some(Effect::EndSession) => self.logout(session).await,
                None => {}
            }
        }

        Ok(Outcome {
            view: self.present(session),
            redirect_url,
        })
    }

    /// Admin data for this session; admin rights are re-checked on every call
    pub async fn admin_overview(&self, session: &mut Session) -> Result<AdminOverview> {
        self.refresh_auth(session);
        let auth = self.auth_status(session);

        if !auth.authenticated {
            return Err(AppError::Unauthorized {
                message: "sign in required".to_string(),
            });
        }
        if !auth.is_admin {
            return Err(AppError::Forbidden {
                message: "admin access required".to_string(),
            });
        }

        Ok(admin::overview(self.recorder.store().map(|s| s.as_ref())).await)
    }
}
