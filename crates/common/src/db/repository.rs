//! Repository pattern for database operations
//!
//! Postgres-backed `UsageStore` over the `users` and `usage` tables.

use super::models::*;
use super::{DbPool, UsageStore};
use crate::errors::Result;
use crate::identity::Identity;
use crate::usage::{UsageRecord, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Insert, QueryOrder, Schema, Set};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// Create the `users` and `usage` tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn();
        let backend = conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut users = schema.create_table_from_entity(UserEntity);
        users.if_not_exists();
        conn.execute(backend.build(&users)).await?;

        let mut usage = schema.create_table_from_entity(UsageEntity);
        usage.if_not_exists();
        conn.execute(backend.build(&usage)).await?;

        tracing::info!("Database schema ready");
        Ok(())
    }
}

/// Insert a profile, or refresh everything but `created_at` when the uid exists
fn user_upsert(uid: &str, identity: &Identity, now: DateTime<Utc>) -> Insert<UserActiveModel> {
    let user = UserActiveModel {
        uid: Set(uid.to_string()),
        name: Set(identity.display_name.clone()),
        email: Set(identity.email.clone().unwrap_or_default()),
        picture: Set(identity.picture_url.clone().unwrap_or_default()),
        created_at: Set(now.into()),
        last_login_at: Set(now.into()),
    };

    UserEntity::insert(user).on_conflict(
        OnConflict::column(UserColumn::Uid)
            .update_columns([
                UserColumn::Name,
                UserColumn::Email,
                UserColumn::Picture,
                UserColumn::LastLoginAt,
            ])
            .to_owned(),
    )
}

impl From<User> for UserRecord {
    fn from(model: User) -> Self {
        UserRecord {
            uid: model.uid,
            name: model.name,
            email: model.email,
            picture: model.picture,
            created_at: model.created_at.with_timezone(&Utc),
            last_login_at: model.last_login_at.with_timezone(&Utc),
        }
    }
}

impl From<Usage> for UsageRecord {
    fn from(model: Usage) -> Self {
        UsageRecord {
            last_session_seconds: model.last_session_seconds,
            last_session_message_count: model.last_session_messages,
            last_updated: model.last_updated.with_timezone(&Utc),
        }
    }
}

#[async_trait]
impl UsageStore for Repository {
    async fn upsert_user(&self, uid: &str, identity: &Identity, now: DateTime<Utc>) -> Result<()> {
        user_upsert(uid, identity, now).exec(self.conn()).await?;
        Ok(())
    }

    async fn upsert_usage(&self, uid: &str, record: &UsageRecord) -> Result<()> {
        let usage = UsageActiveModel {
            uid: Set(uid.to_string()),
            last_session_seconds: Set(record.last_session_seconds),
            last_session_messages: Set(record.last_session_message_count),
            last_updated: Set(record.last_updated.into()),
        };

        UsageEntity::insert(usage)
            .on_conflict(
                OnConflict::column(UsageColumn::Uid)
                    .update_columns([
                        UsageColumn::LastSessionSeconds,
                        UsageColumn::LastSessionMessages,
                        UsageColumn::LastUpdated,
                    ])
                    .to_owned(),
            )
            .exec(self.conn())
            .await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let users = UserEntity::find()
            .order_by_asc(UserColumn::Uid)
            .all(self.conn())
            .await?;

        Ok(users.into_iter().map(UserRecord::from).collect())
    }

    async fn list_usage(&self) -> Result<Vec<(String, UsageRecord)>> {
        let rows = UsageEntity::find().all(self.conn()).await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.uid.clone(), UsageRecord::from(row)))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
