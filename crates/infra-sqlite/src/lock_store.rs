// SQLite LockStore Implementation

use crate::error::map_sqlx_error;
use crate::migration::run_migrations;
use async_trait::async_trait;
use courier_core::domain::{ConcurrencyLock, LockAcquisition};
use courier_core::error::Result;
use courier_core::port::{LockStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteLockStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteLockStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn initialize(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    async fn try_acquire(&self, scope: &str, owner: &str, lease_ms: i64) -> Result<LockAcquisition> {
        let now = self.time_provider.now_millis();

        // Insert-if-absent-or-expired: the upsert only overwrites a row whose
        // lease ran out or that the caller already owns
        let row = sqlx::query_as::<_, ConcurrencyLockRow>(
            r#"
            INSERT INTO concurrency_locks (scope, owner_id, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(scope) DO UPDATE SET
                owner_id = excluded.owner_id,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE concurrency_locks.expires_at <= excluded.acquired_at
               OR concurrency_locks.owner_id = excluded.owner_id
            RETURNING scope, owner_id, acquired_at, expires_at
            "#,
        )
        .bind(scope)
        .bind(owner)
        .bind(now)
        .bind(now + lease_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(match row {
            Some(row) => LockAcquisition::Acquired(row.into()),
            None => LockAcquisition::AlreadyLocked,
        })
    }

    async fn extend(&self, scope: &str, owner: &str, lease_ms: i64) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            "UPDATE concurrency_locks SET expires_at = ? \
             WHERE scope = ? AND owner_id = ? AND expires_at > ?",
        )
        .bind(now + lease_ms)
        .bind(scope)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, scope: &str, owner: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM concurrency_locks WHERE scope = ? AND owner_id = ?")
            .bind(scope)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, scope: &str) -> Result<Option<ConcurrencyLock>> {
        let row = sqlx::query_as::<_, ConcurrencyLockRow>(
            "SELECT scope, owner_id, acquired_at, expires_at FROM concurrency_locks WHERE scope = ?",
        )
        .bind(scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM concurrency_locks")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConcurrencyLockRow {
    scope: String,
    owner_id: String,
    acquired_at: i64,
    expires_at: i64,
}

impl From<ConcurrencyLockRow> for ConcurrencyLock {
    fn from(row: ConcurrencyLockRow) -> Self {
        Self {
            scope: row.scope,
            owner_id: row.owner_id,
            acquired_at: row.acquired_at,
            expires_at: row.expires_at,
        }
    }
}
