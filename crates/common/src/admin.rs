//! Admin aggregation over stored profiles and usage

use crate::db::UsageStore;
use crate::errors::{AppError, Result};
use crate::usage::{UsageRecord, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the admin dashboard can show
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminOverview {
    /// Persistence is disabled or the backend could not be read
    Unavailable { reason: String },
    Available(AdminReport),
}

/// One user joined with their last-session usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUsageRow {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
    pub last_session_seconds: i64,
    pub last_session_messages: i64,
    /// `None` when the user has no usage record yet
    pub usage_last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub users: usize,
    pub messages: i64,
    pub seconds: i64,
    pub minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminReport {
    pub rows: Vec<UserUsageRow>,
    pub totals: UsageTotals,
}

impl AdminReport {
    /// Join users with usage. Users without usage count as zero; usage
    /// without a user is ignored. Rows are ordered by uid.
    pub fn build(
        users: Vec<UserRecord>,
        usage: Vec<(String, UsageRecord)>,
    ) -> Self {
        let usage: HashMap<String, UsageRecord> = usage.into_iter().collect();

        let mut rows: Vec<UserUsageRow> = users
            .into_iter()
            .map(|user| {
                let record = usage.get(&user.uid);
                UserUsageRow {
                    last_session_seconds: record.map(|r| r.last_session_seconds).unwrap_or(0),
                    last_session_messages: record
                        .map(|r| r.last_session_message_count)
                        .unwrap_or(0),
                    usage_last_updated: record.map(|r| r.last_updated),
                    uid: user.uid,
                    name: user.name,
                    email: user.email,
                    created_at: user.created_at,
                    last_login_at: user.last_login_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.uid.cmp(&b.uid));

        let seconds: i64 = rows.iter().map(|r| r.last_session_seconds).sum();
        let totals = UsageTotals {
            users: rows.len(),
            messages: rows.iter().map(|r| r.last_session_messages).sum(),
            seconds,
            minutes: seconds / 60,
        };

        Self { rows, totals }
    }

    /// Render the rows as CSV with a header line
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer
            .write_record([
                "uid",
                "name",
                "email",
                "created_at",
                "last_login_at",
                "last_session_seconds",
                "last_session_messages",
                "usage_last_updated",
            ])
            .map_err(csv_error)?;

        for row in &self.rows {
            writer
                .write_record([
                    row.uid.clone(),
                    row.name.clone(),
                    row.email.clone(),
                    row.created_at.to_rfc3339(),
                    row.last_login_at.to_rfc3339(),
                    row.last_session_seconds.to_string(),
                    row.last_session_messages.to_string(),
                    row.usage_last_updated
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                ])
                .map_err(csv_error)?;
        }

        let bytes = writer.into_inner().map_err(|e| AppError::Internal {
            message: format!("Failed to finish CSV export: {}", e),
        })?;

        String::from_utf8(bytes).map_err(|e| AppError::Internal {
            message: format!("CSV export is not valid UTF-8: {}", e),
        })
    }
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Internal {
        message: format!("Failed to write CSV: {}", e),
    }
}

/// Read everything the dashboard shows. Never fails: problems are reported
/// as `Unavailable`.
pub async fn overview(store: Option<&dyn UsageStore>) -> AdminOverview {
    let Some(store) = store else {
        return AdminOverview::Unavailable {
            reason: "Usage persistence is not configured".to_string(),
        };
    };

    let users = match store.list_users().await {
        Ok(users) => users,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load users for admin view");
            return AdminOverview::Unavailable {
                reason: format!("Could not load users: {}", e),
            };
        }
    };

    let usage = match store.list_usage().await {
        Ok(usage) => usage,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load usage for admin view");
            return AdminOverview::Unavailable {
                reason: format!("Could not load usage: {}", e),
            };
        }
    };

    AdminOverview::Available(AdminReport::build(users, usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::identity::Identity;
    use async_trait::async_trait;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn identity(sub: &str, name: &str) -> Identity {
        Identity {
            subject_id: Some(sub.to_string()),
            email: Some(format!("{}@example.org", sub)),
            display_name: name.to_string(),
            picture_url: None,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let now = at("2026-06-01T12:00:00Z");

        store.upsert_user("b-user", &identity("b-user", "Bea"), now).await.unwrap();
        store.upsert_user("a-user", &identity("a-user", "Al"), now).await.unwrap();
        store.upsert_user("c-user", &identity("c-user", "Cy"), now).await.unwrap();

        store
            .upsert_usage(
                "a-user",
                &UsageRecord {
                    last_session_seconds: 90,
                    last_session_message_count: 4,
                    last_updated: now,
                },
            )
            .await
            .unwrap();
        store
            .upsert_usage(
                "b-user",
                &UsageRecord {
                    last_session_seconds: 45,
                    last_session_message_count: 2,
                    last_updated: now,
                },
            )
            .await
            .unwrap();
        // Orphan usage is not reported
        store
            .upsert_usage(
                "ghost",
                &UsageRecord {
                    last_session_seconds: 999,
                    last_session_message_count: 99,
                    last_updated: now,
                },
            )
            .await
            .unwrap();

        store
    }

    #[tokio::test]
    async fn test_overview_joins_and_sums() {
        let store = seeded().await;

        let AdminOverview::Available(report) = overview(Some(&store)).await else {
            panic!("expected report");
        };

        let uids: Vec<&str> = report.rows.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(uids, vec!["a-user", "b-user", "c-user"]);

        let missing = &report.rows[2];
        assert_eq!(missing.last_session_seconds, 0);
        assert_eq!(missing.last_session_messages, 0);
        assert!(missing.usage_last_updated.is_none());

        assert_eq!(
            report.totals,
            UsageTotals {
                users: 3,
                messages: 6,
                seconds: 135,
                minutes: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_overview_without_store() {
        assert!(matches!(overview(None).await, AdminOverview::Unavailable { .. }));
    }

    struct BrokenStore;

    #[async_trait]
    impl UsageStore for BrokenStore {
        async fn upsert_user(&self, _: &str, _: &Identity, _: DateTime<Utc>) -> Result<()> {
            Ok(())
        }

        async fn upsert_usage(&self, _: &str, _: &UsageRecord) -> Result<()> {
            Ok(())
        }

        async fn list_users(&self) -> Result<Vec<UserRecord>> {
            Err(AppError::PersistenceUnavailable)
        }

        async fn list_usage(&self) -> Result<Vec<(String, UsageRecord)>> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<()> {
            Err(AppError::PersistenceUnavailable)
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_unavailable() {
        let overview = overview(Some(&BrokenStore)).await;
        assert!(matches!(overview, AdminOverview::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_csv_export() {
        let store = seeded().await;
        let AdminOverview::Available(report) = overview(Some(&store)).await else {
            panic!("expected report");
        };

        let csv = report.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "uid,name,email,created_at,last_login_at,last_session_seconds,last_session_messages,usage_last_updated"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("a-user,Al,a-user@example.org,"));
        assert!(lines[1].contains(",90,4,"));
        assert!(lines[3].ends_with(",0,0,"));
    }

    #[test]
    fn test_csv_quotes_commas() {
        let now = at("2026-06-01T12:00:00Z");
        let report = AdminReport::build(
            vec![UserRecord {
                uid: "u1".to_string(),
                name: "Lovelace, Ada".to_string(),
                email: "ada@example.org".to_string(),
                picture: String::new(),
                created_at: now,
                last_login_at: now,
            }],
            Vec::new(),
        );

        let csv = report.to_csv().unwrap();
        assert!(csv.contains("\"Lovelace, Ada\""));
    }
}
