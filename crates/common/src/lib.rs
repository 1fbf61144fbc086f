//! LinguaChat Common Library
//!
//! Everything the gateway needs to run a chat session. Routing stays in the
//! gateway; the only HTTP piece here is `AppError`'s `IntoResponse`.
//!
//! - View-state machine and session lifecycle
//! - Language detection and the remote chat model client
//! - Identity verification and admin policy
//! - Usage persistence and the admin report
//! - Error types, configuration and metrics

pub mod admin;
pub mod chat;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod language;
pub mod metrics;
pub mod session;
pub mod usage;
pub mod view;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use session::{Action, ChatService, Outcome, Session};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chat model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
