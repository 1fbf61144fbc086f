//! Usage telemetry records and the best-effort recorder

use crate::clock::Clock;
use crate::db::UsageStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Last-session telemetry for one identity. Overwritten on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub last_session_seconds: i64,
    pub last_session_message_count: i64,
    pub last_updated: DateTime<Utc>,
}

/// Profile row kept per identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub picture: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

/// Writes usage records when a backend is configured, silently otherwise
#[derive(Clone)]
pub struct UsageRecorder {
    store: Option<Arc<dyn UsageStore>>,
    clock: Arc<dyn Clock>,
}

impl UsageRecorder {
    pub fn new(store: Option<Arc<dyn UsageStore>>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> Option<&Arc<dyn UsageStore>> {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Build the record for a session as of now
    pub fn snapshot(&self, session_start: DateTime<Utc>, message_count: u64) -> UsageRecord {
        let now = self.clock.now();
        UsageRecord {
            last_session_seconds: (now - session_start).num_seconds().max(0),
            last_session_message_count: i64::try_from(message_count).unwrap_or(i64::MAX),
            last_updated: now,
        }
    }

    /// Overwrite the usage record for `user_key`. Never fails.
    pub async fn record(&self, user_key: &str, session_start: DateTime<Utc>, message_count: u64) {
        let Some(store) = self.store.as_ref() else {
            tracing::debug!(user_key = %user_key, "Persistence disabled, usage not recorded");
            return;
        };

        let record = self.snapshot(session_start, message_count);
        match store.upsert_usage(user_key, &record).await {
            Ok(()) => {
                crate::metrics::record_usage_write(true);
                tracing::debug!(
                    user_key = %user_key,
                    seconds = record.last_session_seconds,
                    messages = record.last_session_message_count,
                    "Usage recorded"
                );
            }
            Err(e) => {
                crate::metrics::record_usage_write(false);
                tracing::warn!(user_key = %user_key, error = %e, "Failed to record usage");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::MemoryStore;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_record_overwrites() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let recorder = UsageRecorder::new(Some(store.clone()), clock.clone());

        clock.advance(chrono::Duration::seconds(90));
        recorder.record("sub-1", start(), 3).await;
        clock.advance(chrono::Duration::seconds(30));
        recorder.record("sub-1", start(), 4).await;

        let usage = store.usage_for("sub-1").unwrap();
        assert_eq!(usage.last_session_seconds, 120);
        assert_eq!(usage.last_session_message_count, 4);
        assert_eq!(store.list_usage().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_arguments_same_shape() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let recorder = UsageRecorder::new(Some(store.clone()), clock.clone());

        recorder.record("sub-1", start(), 2).await;
        let first = store.usage_for("sub-1").unwrap();
        clock.advance(chrono::Duration::milliseconds(400));
        recorder.record("sub-1", start(), 2).await;
        let second = store.usage_for("sub-1").unwrap();

        assert_eq!(first.last_session_seconds, second.last_session_seconds);
        assert_eq!(first.last_session_message_count, second.last_session_message_count);
        assert_ne!(first.last_updated, second.last_updated);
    }

    #[tokio::test]
    async fn test_disabled_backend_is_noop() {
        let recorder = UsageRecorder::new(None, Arc::new(ManualClock::new(start())));
        recorder.record("sub-1", start(), 1).await;
    }

    #[test]
    fn test_clock_skew_never_negative() {
        let recorder = UsageRecorder::new(None, Arc::new(ManualClock::new(start())));
        let later = start() + chrono::Duration::seconds(10);
        assert_eq!(recorder.snapshot(later, 0).last_session_seconds, 0);
    }
}
