//! View-state machine
//!
//! Decides which of the four screens a session sees and how user-triggered
//! navigation changes that. Everything here is pure: the reducer maps
//! `(flags, auth, action)` to new flags plus an optional side effect, and
//! `render` maps a session to a serialisable view descriptor.

use crate::language::{language_label, LanguageTag};
use crate::session::{Role, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Screen shown for one render cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    LoginPrompt,
    Chat,
    AdminDashboard,
}

impl Screen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::Home => "home",
            Screen::LoginPrompt => "login_prompt",
            Screen::Chat => "chat",
            Screen::AdminDashboard => "admin_dashboard",
        }
    }
}

/// Explicit page choice; only meaningful to admins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nav {
    #[default]
    Chat,
    AdminDashboard,
}

impl FromStr for Nav {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "chat" | "chatbot" => Ok(Nav::Chat),
            "admin" | "admindashboard" => Ok(Nav::AdminDashboard),
            _ => Err(format!("unknown page: {}", s)),
        }
    }
}

/// Client-driven navigation state held by the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFlags {
    /// Set by "Get Started"; cleared by "Back" or a fresh session
    pub show_login_requested: bool,
    pub selected_nav: Nav,
}

/// Authentication facts for the current cycle, derived server-side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub is_admin: bool,
}

/// Navigation actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    GetStarted,
    Back,
    Login,
    Navigate(Nav),
    Logout,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Hand control to the identity provider
    RedirectToProvider,
    /// Record usage and reset the session
    EndSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub flags: ViewFlags,
    pub effect: Option<Effect>,
}

/// Select the screen for this cycle. Admin rights are checked here on every
/// call, so a `selected_nav` forced by the client cannot open the dashboard.
pub fn select_screen(flags: &ViewFlags, auth: AuthStatus) -> Screen {
    if auth.authenticated {
        if auth.is_admin && flags.selected_nav == Nav::AdminDashboard {
            Screen::AdminDashboard
        } else {
            Screen::Chat
        }
    } else if flags.show_login_requested {
        Screen::LoginPrompt
    } else {
        Screen::Home
    }
}

/// Apply a navigation action
pub fn reduce(flags: ViewFlags, auth: AuthStatus, action: ViewAction) -> Transition {
    let stay = Transition { flags, effect: None };

    match action {
        ViewAction::GetStarted if !auth.authenticated => Transition {
            flags: ViewFlags {
                show_login_requested: true,
                ..flags
            },
            effect: None,
        },
        ViewAction::GetStarted => stay,
        ViewAction::Back => Transition {
            flags: ViewFlags {
                show_login_requested: false,
                ..flags
            },
            effect: None,
        },
        ViewAction::Login if !auth.authenticated => Transition {
            flags: ViewFlags {
                show_login_requested: true,
                ..flags
            },
            effect: Some(Effect::RedirectToProvider),
        },
        ViewAction::Login => stay,
        ViewAction::Navigate(nav) if auth.authenticated && auth.is_admin => Transition {
            flags: ViewFlags {
                selected_nav: nav,
                ..flags
            },
            effect: None,
        },
        ViewAction::Navigate(_) => stay,
        ViewAction::Logout => Transition {
            flags: ViewFlags::default(),
            effect: Some(Effect::EndSession),
        },
    }
}

/// Serialisable description of what the client should draw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub session_id: Uuid,
    pub screen: Screen,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfilePanel>,
    /// Pages the user may switch between; empty for non-admins
    pub navigation: Vec<Nav>,
    pub conversation: Vec<TurnView>,
    pub chat_available: bool,
}

/// Sidebar contents for a signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePanel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    pub session_seconds: i64,
    pub messages_sent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnView {
    pub role: Role,
    pub text: String,
    /// Detected-language label, shown on user turns only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Inputs to `render` that do not live on the session
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub now: DateTime<Utc>,
    pub banner_url: Option<&'a str>,
    pub chat_available: bool,
}

/// Describe the screen for `session`
pub fn render(session: &Session, auth: AuthStatus, ctx: &RenderContext<'_>) -> ViewDescriptor {
    let screen = select_screen(&session.flags(), auth);

    let profile = match (auth.authenticated, session.identity()) {
        (true, Some(identity)) => Some(ProfilePanel {
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            uid: session.user_key().map(String::from),
            picture_url: identity.picture_url.clone(),
            session_seconds: session
                .session_start()
                .map(|start| (ctx.now - start).num_seconds().max(0))
                .unwrap_or(0),
            messages_sent: session.message_count(),
        }),
        _ => None,
    };

    let navigation = if auth.authenticated && auth.is_admin {
        vec![Nav::Chat, Nav::AdminDashboard]
    } else {
        Vec::new()
    };

    let conversation = if screen == Screen::Chat {
        session
            .conversation()
            .turns()
            .iter()
            .map(|turn| TurnView {
                role: turn.role,
                text: turn.text.clone(),
                language: match (&turn.role, &turn.language) {
                    (Role::User, tag @ (LanguageTag::Code(_) | LanguageTag::Unknown)) => {
                        Some(language_label(tag))
                    }
                    _ => None,
                },
            })
            .collect()
    } else {
        Vec::new()
    };

    let banner_url = match screen {
        Screen::Home | Screen::LoginPrompt => ctx.banner_url.map(String::from),
        _ => None,
    };

    ViewDescriptor {
        session_id: session.id(),
        screen,
        notice: session.notice().map(String::from),
        banner_url,
        profile,
        navigation,
        conversation,
        chat_available: ctx.chat_available,
    }
}
