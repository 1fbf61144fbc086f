//! In-memory `UsageStore`

use super::UsageStore;
use crate::errors::Result;
use crate::identity::Identity;
use crate::usage::{UsageRecord, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, UserRecord>,
    usage: DashMap<String, UsageRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, uid: &str) -> Option<UserRecord> {
        self.users.get(uid).map(|u| u.clone())
    }

    pub fn usage_for(&self, uid: &str) -> Option<UsageRecord> {
        self.usage.get(uid).map(|u| u.clone())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn upsert_user(&self, uid: &str, identity: &Identity, now: DateTime<Utc>) -> Result<()> {
        let name = identity.display_name.clone();
        let email = identity.email.clone().unwrap_or_default();
        let picture = identity.picture_url.clone().unwrap_or_default();

        self.users
            .entry(uid.to_string())
            .and_modify(|user| {
                user.name = name.clone();
                user.email = email.clone();
                user.picture = picture.clone();
                user.last_login_at = now;
            })
            .or_insert_with(|| UserRecord {
                uid: uid.to_string(),
                name: name.clone(),
                email: email.clone(),
                picture: picture.clone(),
                created_at: now,
                last_login_at: now,
            });

        Ok(())
    }

    async fn upsert_usage(&self, uid: &str, record: &UsageRecord) -> Result<()> {
        self.usage.insert(uid.to_string(), record.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        Ok(self.users.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn list_usage(&self) -> Result<Vec<(String, UsageRecord)>> {
        Ok(self
            .usage
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
