//! Per-client session state
//!
//! A `Session` owns everything one browser tab accumulates: view flags,
//! authentication, the visible conversation and the open model dialogue.
//! Mutation goes through `ChatService`; this module only exposes reads plus
//! the crate-internal primitives the service needs.

mod lifecycle;

pub use lifecycle::{Action, ChatService, Outcome, MODEL_UNAVAILABLE_REPLY};

use crate::chat::DialogueHandle;
use crate::identity::Identity;
use crate::language::LanguageTag;
use crate::view::ViewFlags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker of a visible turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One displayed message. Never edited after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub language: LanguageTag,
}

impl Turn {
    pub fn user(text: impl Into<String>, language: LanguageTag) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            language,
        }
    }

    pub fn assistant(text: impl Into<String>, language: LanguageTag) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            language,
        }
    }
}

/// Append-only turn list; only `clear` removes anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }
}

/// State for one client
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    pub(crate) flags: ViewFlags,
    pub(crate) authenticated: bool,
    pub(crate) credential: Option<String>,
    pub(crate) identity: Option<Identity>,
    pub(crate) user_key: Option<String>,
    pub(crate) conversation: Conversation,
    pub(crate) message_count: u64,
    pub(crate) session_start: Option<DateTime<Utc>>,
    pub(crate) dialogue: Option<DialogueHandle>,
    pub(crate) notice: Option<String>,
}

impl Session {
    /// Fresh anonymous session on the Home screen
    pub fn new(id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            flags: ViewFlags::default(),
            authenticated: false,
            credential: None,
            identity: None,
            user_key: None,
            conversation: Conversation::default(),
            message_count: 0,
            session_start: None,
            dialogue: None,
            notice: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn flags(&self) -> ViewFlags {
        self.flags
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn user_key(&self) -> Option<&str> {
        self.user_key.as_deref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Messages submitted since the session started or the chat was cleared
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }

    pub fn has_dialogue(&self) -> bool {
        self.dialogue.is_some()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Drop everything but the id, as a logout does
    pub(crate) fn reset(&mut self) {
        *self = Session::new(self.id, self.created_at);
    }
}
