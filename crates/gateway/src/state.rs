//! Shared gateway state and the in-memory session registry

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use linguachat_common::{
    chat::create_chat_client,
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::{create_store, UsageStore},
    errors::{AppError, Result},
    identity::{AdminPolicy, IdentityProvider, JwtIdentityProvider},
    language::WhatlangDetector,
    metrics,
    usage::UsageRecorder,
    Action, ChatService, Outcome, Session,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<ChatService>,
    pub sessions: SessionRegistry,
    pub store: Option<Arc<dyn UsageStore>>,
}

impl AppState {
    /// Wire the chat service from configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let store = create_store(&config.database).await?;
        let chat = create_chat_client(&config.model)?;

        let identity: Option<Arc<dyn IdentityProvider>> =
            match JwtIdentityProvider::from_config(&config.identity) {
                Some(provider) => Some(Arc::new(provider)),
                None => {
                    warn!("No identity token secret configured, login is disabled");
                    None
                }
            };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let recorder = UsageRecorder::new(store.clone(), clock.clone());

        let mut service = ChatService::new(
            Arc::new(WhatlangDetector::new()),
            chat,
            identity,
            AdminPolicy::from_config(&config.identity),
            recorder,
        )
        .with_banner_url(config.ui.banner_url.clone());

        if let Some(ref prompt) = config.model.system_prompt {
            service = service.with_system_prompt(prompt.clone());
        }

        info!(
            chat_available = service.chat_available(),
            login_available = service.login_available(),
            persistence = store.is_some(),
            session_idle_secs = config.server.session_idle_secs,
            "Chat service ready"
        );

        Ok(Self {
            sessions: SessionRegistry::new(config.session_idle(), clock),
            config: Arc::new(config),
            service: Arc::new(service),
            store,
        })
    }

    /// Open a new session, sweeping idle ones first
    pub async fn open_session(&self) -> Arc<Mutex<Session>> {
        self.evict_idle().await;
        self.sessions.create()
    }

    /// Look up a live session. A miss sweeps idle sessions, so an expired
    /// session still gets its usage recorded.
    pub async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>> {
        let found = self.sessions.get(id);
        if found.is_err() {
            self.evict_idle().await;
        }
        found
    }

    /// Drop idle sessions and record their usage as on logout
    pub async fn evict_idle(&self) -> usize {
        let evicted = self.sessions.take_idle();

        for handle in &evicted {
            let mut session = handle.lock().await;
            info!(session_id = %session.id(), "Evicting idle session");
            self.service.logout(&mut session).await;
        }

        evicted.len()
    }

    /// Apply an action on its own task. The task owns the session lock, so
    /// the action finishes even if the caller goes away.
    pub async fn dispatch(&self, id: Uuid, action: Action) -> Result<Outcome> {
        let handle = self.session(id).await?;
        let service = self.service.clone();

        let task = tokio::spawn(async move {
            let mut session = handle.lock_owned().await;
            service.dispatch(&mut session, action).await
        });

        task.await.map_err(|e| AppError::Internal {
            message: format!("Session action did not complete: {}", e),
        })?
    }
}

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_seen: DateTime<Utc>,
}

/// Live sessions keyed by id. Each session sits behind its own async mutex
/// so one action runs at a time per session.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionSlot>>,
    idle_limit: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(idle_limit: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_limit: chrono::Duration::from_std(idle_limit)
                .unwrap_or_else(|_| chrono::Duration::weeks(52)),
            clock,
        }
    }

    pub fn create(&self) -> Arc<Mutex<Session>> {
        let id = Uuid::new_v4();
        let now = self.clock.now();
        let session = Arc::new(Mutex::new(Session::new(id, now)));
        self.sessions.insert(
            id,
            SessionSlot {
                session: session.clone(),
                last_seen: now,
            },
        );
        metrics::set_active_sessions(self.sessions.len());
        session
    }

    /// Fetch a session and mark it as seen. Idle sessions are reported as
    /// missing and left for `take_idle`.
    pub fn get(&self, id: Uuid) -> Result<Arc<Mutex<Session>>> {
        let now = self.clock.now();
        let mut slot = self
            .sessions
            .get_mut(&id)
            .filter(|slot| now - slot.last_seen <= self.idle_limit)
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;

        slot.last_seen = now;
        Ok(slot.session.clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        let removed = self.sessions.remove(&id).map(|(_, slot)| slot.session);
        metrics::set_active_sessions(self.sessions.len());
        removed
    }

    /// Remove and return every session idle past the limit
    pub fn take_idle(&self) -> Vec<Arc<Mutex<Session>>> {
        let now = self.clock.now();
        let mut evicted = Vec::new();

        self.sessions.retain(|_, slot| {
            if now - slot.last_seen > self.idle_limit {
                evicted.push(slot.session.clone());
                false
            } else {
                true
            }
        });

        if !evicted.is_empty() {
            metrics::set_active_sessions(self.sessions.len());
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
