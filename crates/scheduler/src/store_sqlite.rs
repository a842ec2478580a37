//! SQLite-backed schedule store using sqlx.
//!
//! Rows keep the full message as a JSON blob plus dedicated `status`,
//! `due_at_ms`, and `tenant` columns so the due scan and the CAS claim
//! run as plain indexed SQL.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{store::ScheduleStore, types::ScheduledMessage};

/// Create the `scheduled_messages` table. Call once at startup before
/// using [`SqliteScheduleStore::with_pool`].
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scheduled_messages (
            id        TEXT PRIMARY KEY,
            tenant    TEXT NOT NULL,
            status    TEXT NOT NULL,
            due_at_ms INTEGER NOT NULL,
            data      TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scheduled_due
         ON scheduled_messages (status, due_at_ms)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub struct SqliteScheduleStore {
    pool: SqlitePool,
}

impl SqliteScheduleStore {
    /// Connect with a dedicated pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Use an existing pool; migrations must already have run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<ScheduledMessage>> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let data: String = row.get("data");
        messages.push(serde_json::from_str(&data)?);
    }
    Ok(messages)
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn insert(&self, message: ScheduledMessage) -> Result<()> {
        let data = serde_json::to_string(&message)?;
        sqlx::query(
            "INSERT INTO scheduled_messages (id, tenant, status, due_at_ms, data)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 tenant = excluded.tenant,
                 status = excluded.status,
                 due_at_ms = excluded.due_at_ms,
                 data = excluded.data",
        )
        .bind(&message.id)
        .bind(&message.tenant)
        .bind(message.status.as_str())
        .bind(message.due_at_ms as i64)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledMessage>> {
        let row = sqlx::query("SELECT data FROM scheduled_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            },
            None => Ok(None),
        }
    }

    async fn list(&self, tenant: Option<&str>) -> Result<Vec<ScheduledMessage>> {
        let rows = match tenant {
            Some(tenant) => {
                sqlx::query(
                    "SELECT data FROM scheduled_messages WHERE tenant = ? ORDER BY due_at_ms",
                )
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query("SELECT data FROM scheduled_messages ORDER BY due_at_ms")
                    .fetch_all(&self.pool)
                    .await?
            },
        };
        decode_rows(rows)
    }

    async fn due(&self, now_ms: u64) -> Result<Vec<ScheduledMessage>> {
        let rows = sqlx::query(
            "SELECT data FROM scheduled_messages
             WHERE status = 'pending' AND due_at_ms <= ?
             ORDER BY due_at_ms",
        )
        .bind(now_ms as i64)
        .fetch_all(&self.pool)
        .await?;
        decode_rows(rows)
    }

    async fn claim(&self, id: &str) -> Result<bool> {
        // The status predicate makes this a CAS; losing claimers see zero
        // affected rows.
        let result = sqlx::query(
            "UPDATE scheduled_messages
             SET status = 'sending', data = json_set(data, '$.status', 'sending')
             WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_sent(&self, id: &str, sent_at_ms: u64) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_messages
             SET status = 'sent',
                 data = json_set(data, '$.status', 'sent', '$.sentAtMs', ?)
             WHERE id = ? AND status = 'sending'",
        )
        .bind(sent_at_ms as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_messages
             SET status = 'failed',
                 data = json_set(data, '$.status', 'failed', '$.error', ?)
             WHERE id = ? AND status IN ('pending', 'sending')",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
