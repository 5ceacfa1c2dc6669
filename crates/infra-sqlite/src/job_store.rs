// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use crate::migration::run_migrations;
use async_trait::async_trait;
use courier_core::domain::{Job, JobId, JobPayload, JobStatus, JobType};
use courier_core::error::Result;
use courier_core::port::{ClaimRequest, JobStore, TimeProvider};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

// Row guard shared by every fenced write: the caller must still hold the lease
const LEASE_FENCE: &str = "locked_by = ? AND status IN ('claimed', 'processing')";

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Run a fenced UPDATE; `true` if the row was still leased by `owner`
    async fn fenced_update(
        &self,
        set_clause: &str,
        binds: FencedBinds<'_>,
        id: &JobId,
        owner: &str,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE jobs SET {}, updated_at = ? WHERE id = ? AND {}",
            set_clause, LEASE_FENCE
        );
        let mut query = sqlx::query(&sql);
        for value in binds.ints {
            query = query.bind(*value);
        }
        if let Some(text) = binds.text {
            query = query.bind(text);
        }
        let result = query
            .bind(self.time_provider.now_millis())
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}

/// Values bound to a fenced SET clause, integers first, then one optional text
#[derive(Default)]
struct FencedBinds<'a> {
    ints: &'a [i64],
    text: Option<&'a str>,
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn initialize(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, queue, job_type, payload, status,
                attempt, max_attempts, priority, available_at,
                locked_by, locked_until, created_at, updated_at,
                last_error, original_job_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue)
        .bind(job.job_type.as_str())
        .bind(job.payload.as_value().to_string())
        .bind(job.status.as_str())
        .bind(job.attempt)
        .bind(job.max_attempts)
        .bind(job.priority)
        .bind(job.available_at)
        .bind(&job.locked_by)
        .bind(job.locked_until)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(&job.last_error)
        .bind(&job.original_job_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim_batch(&self, request: &ClaimRequest) -> Result<Vec<Job>> {
        // One statement: SQLite serialises writers, so the subquery's pick and
        // the lease write cannot interleave with another claim
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'claimed', locked_by = ?, locked_until = ?, updated_at = ?
            WHERE id IN (
                SELECT id FROM jobs
                WHERE queue = ?
                  AND (
                      (status = 'pending' AND available_at <= ?)
                      OR (status IN ('claimed', 'processing')
                          AND (locked_until IS NULL OR locked_until < ?))
                  )
                ORDER BY priority DESC, available_at ASC, created_at ASC, id ASC
                LIMIT ?
            )
            RETURNING *
            "#,
        )
        .bind(&request.owner)
        .bind(request.now + request.lease_ms)
        .bind(request.now)
        .bind(&request.queue)
        .bind(request.now)
        .bind(request.now)
        .bind(request.limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>>>()?;

        // RETURNING order is unspecified
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.available_at.cmp(&b.available_at))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    async fn mark_processing(&self, id: &JobId, owner: &str, locked_until: i64) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let sql = format!(
            "UPDATE jobs SET status = 'processing', locked_until = ?, updated_at = ? \
             WHERE id = ? AND {} AND locked_until >= ?",
            LEASE_FENCE
        );
        let result = sqlx::query(&sql)
            .bind(locked_until)
            .bind(now)
            .bind(id)
            .bind(owner)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn extend_lease(&self, id: &JobId, owner: &str, locked_until: i64) -> Result<bool> {
        let binds = FencedBinds {
            ints: &[locked_until],
            text: None,
        };
        self.fenced_update("locked_until = ?", binds, id, owner).await
    }

    async fn settle_complete(&self, id: &JobId, owner: &str) -> Result<bool> {
        self.fenced_update(
            "status = 'completed', locked_by = NULL, locked_until = NULL",
            FencedBinds::default(),
            id,
            owner,
        )
        .await
    }

    async fn settle_retry(
        &self,
        id: &JobId,
        owner: &str,
        available_at: i64,
        error: &str,
    ) -> Result<bool> {
        let binds = FencedBinds {
            ints: &[available_at],
            text: Some(error),
        };
        self.fenced_update(
            "status = 'pending', attempt = attempt + 1, available_at = ?, last_error = ?, \
             locked_by = NULL, locked_until = NULL",
            binds,
            id,
            owner,
        )
        .await
    }

    async fn settle_failed(&self, id: &JobId, owner: &str, error: &str) -> Result<Option<Job>> {
        let sql = format!(
            "UPDATE jobs \
             SET status = 'failed', attempt = attempt + 1, last_error = ?, \
                 locked_until = NULL, updated_at = ? \
             WHERE id = ? AND {} \
             RETURNING *",
            LEASE_FENCE
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(error)
            .bind(self.time_provider.now_millis())
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(row) = row {
            return row.into_job().map(Some);
        }

        // Already failed by this owner on an earlier try
        sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE id = ? AND locked_by = ? AND status = 'failed'",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(JobRow::into_job)
        .transpose()
    }

    async fn reclaim_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', locked_by = NULL, locked_until = NULL, updated_at = ?
            WHERE status IN ('claimed', 'processing')
              AND (locked_until IS NULL OR locked_until < ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, queue: &str) -> Result<HashMap<JobStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs WHERE queue = ? GROUP BY status")
                .bind(queue)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut counts = HashMap::with_capacity(rows.len());
        for (status, count) in rows {
            counts.insert(JobStatus::from_str(&status)?, count);
        }
        Ok(counts)
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed') AND updated_at < ?",
        )
        .bind(finished_before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM jobs")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    job_type: String,
    payload: String,
    status: String,
    attempt: i32,
    max_attempts: i32,
    priority: i32,
    available_at: i64,
    locked_by: Option<String>,
    locked_until: Option<i64>,
    created_at: i64,
    updated_at: i64,
    last_error: Option<String>,
    original_job_id: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            status: JobStatus::from_str(&self.status)?,
            payload: JobPayload::new(serde_json::from_str(&self.payload)?),
            id: self.id,
            queue: self.queue,
            job_type: JobType::new(self.job_type),
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            priority: self.priority,
            available_at: self.available_at,
            locked_by: self.locked_by,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_error: self.last_error,
            original_job_id: self.original_job_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;
    use courier_core::port::time_provider::mocks::MockTimeProvider;
    use serde_json::json;

    async fn setup() -> (Arc<MockTimeProvider>, SqliteJobStore) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let clock = Arc::new(MockTimeProvider::new(10_000));
        let store = SqliteJobStore::new(pool, clock.clone());
        store.initialize().await.unwrap();
        (clock, store)
    }

    fn job(id: &str, priority: i32, available_at: i64) -> Job {
        let mut job = Job::new(
            id,
            1_000,
            "mail",
            JobType::new("email.send"),
            JobPayload::new(json!({"to": "a@example.com"})),
        );
        job.priority = priority;
        job.available_at = available_at;
        job
    }

    fn claim(owner: &str, now: i64, limit: i64) -> ClaimRequest {
        ClaimRequest {
            queue: "mail".into(),
            owner: owner.into(),
            limit,
            now,
            lease_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (_, store) = setup().await;
        let mut original = job("j1", 3, 1_000);
        original.original_job_id = Some("j0".into());
        store.insert(&original).await.unwrap();

        let found = store.find_by_id(&"j1".to_string()).await.unwrap().unwrap();
        assert_eq!(found.queue, "mail");
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.priority, 3);
        assert_eq!(found.payload.as_value(), &json!({"to": "a@example.com"}));
        assert_eq!(found.original_job_id.as_deref(), Some("j0"));
        assert!(store.find_by_id(&"nope".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_batch_order_and_limit() {
        let (_, store) = setup().await;
        store.insert(&job("low", 0, 100)).await.unwrap();
        store.insert(&job("high", 9, 900)).await.unwrap();
        store.insert(&job("early", 0, 50)).await.unwrap();
        store.insert(&job("future", 99, 50_000)).await.unwrap();

        let claimed = store.claim_batch(&claim("w1", 10_000, 2)).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "early"]);
        assert!(claimed.iter().all(|j| j.status == JobStatus::Claimed));
        assert!(claimed.iter().all(|j| j.locked_until == Some(15_000)));

        let rest = store.claim_batch(&claim("w2", 10_000, 10)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "low");
    }

    #[tokio::test]
    async fn test_expired_lease_is_claimable_again() {
        let (_, store) = setup().await;
        store.insert(&job("j", 0, 0)).await.unwrap();
        store.claim_batch(&claim("w1", 10_000, 1)).await.unwrap();

        assert!(store.claim_batch(&claim("w2", 15_000, 1)).await.unwrap().is_empty());
        let stolen = store.claim_batch(&claim("w2", 15_001, 1)).await.unwrap();
        assert_eq!(stolen[0].locked_by.as_deref(), Some("w2"));
        assert_eq!(stolen[0].attempt, 0);
    }

    #[tokio::test]
    async fn test_fenced_settlement() {
        let (_, store) = setup().await;
        let id = "j".to_string();
        store.insert(&job("j", 0, 0)).await.unwrap();
        store.claim_batch(&claim("w1", 10_000, 1)).await.unwrap();

        assert!(!store.mark_processing(&id, "w2", 20_000).await.unwrap());
        assert!(store.mark_processing(&id, "w1", 20_000).await.unwrap());
        assert!(store.extend_lease(&id, "w1", 40_000).await.unwrap());
        assert!(!store.settle_complete(&id, "w2").await.unwrap());

        assert!(store.settle_retry(&id, "w1", 12_000, "smtp timeout").await.unwrap());
        let retried = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.available_at, 12_000);
        assert_eq!(retried.last_error.as_deref(), Some("smtp timeout"));
        assert!(retried.locked_by.is_none());

        // Lease gone: residual writes are rejected
        assert!(!store.settle_complete(&id, "w1").await.unwrap());
        assert!(store.settle_failed(&id, "w1", "late").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_failed_returns_final_document() {
        let (_, store) = setup().await;
        let id = "j".to_string();
        let mut j = job("j", 0, 0);
        j.attempt = 2;
        store.insert(&j).await.unwrap();
        store.claim_batch(&claim("w1", 10_000, 1)).await.unwrap();

        let failed = store.settle_failed(&id, "w1", "boom").await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempt, 3);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
        assert!(failed.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_mark_processing_renews_live_lease_only() {
        let (clock, store) = setup().await;
        store.insert(&job("live", 0, 0)).await.unwrap();
        store.insert(&job("stale", 0, 0)).await.unwrap();
        store.claim_batch(&claim("w1", 10_000, 2)).await.unwrap();

        assert!(store.mark_processing(&"live".to_string(), "w1", 40_000).await.unwrap());
        let live = store.find_by_id(&"live".to_string()).await.unwrap().unwrap();
        assert_eq!(live.status, JobStatus::Processing);
        assert_eq!(live.locked_until, Some(40_000));

        // Claimed until 15_000; waited too long for a permit
        clock.set(15_001);
        assert!(!store.mark_processing(&"stale".to_string(), "w1", 45_001).await.unwrap());
        let stolen = store.claim_batch(&claim("w2", 15_001, 10)).await.unwrap();
        assert_eq!(stolen.len(), 1);
        assert_eq!(stolen[0].id, "stale");
    }

    #[tokio::test]
    async fn test_settle_failed_is_repeatable_by_owner() {
        let (_, store) = setup().await;
        let id = "j".to_string();
        store.insert(&job("j", 0, 0)).await.unwrap();
        store.claim_batch(&claim("w1", 10_000, 1)).await.unwrap();

        let first = store.settle_failed(&id, "w1", "boom").await.unwrap().unwrap();
        let again = store.settle_failed(&id, "w1", "boom").await.unwrap().unwrap();
        assert_eq!(again.attempt, first.attempt);
        assert_eq!(again.status, JobStatus::Failed);
        assert!(store.settle_failed(&id, "w2", "boom").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reclaim_count_and_purge() {
        let (clock, store) = setup().await;
        for id in ["a", "b", "c"] {
            store.insert(&job(id, 0, 0)).await.unwrap();
        }
        let claimed = store.claim_batch(&claim("w1", 10_000, 3)).await.unwrap();
        assert!(store.settle_complete(&claimed[0].id, "w1").await.unwrap());

        assert_eq!(store.reclaim_expired(15_000).await.unwrap(), 0);
        assert_eq!(store.reclaim_expired(15_001).await.unwrap(), 2);

        let counts = store.count_by_status("mail").await.unwrap();
        assert_eq!(counts.get(&JobStatus::Pending), Some(&2));
        assert_eq!(counts.get(&JobStatus::Completed), Some(&1));
        assert!(store.count_by_status("other").await.unwrap().is_empty());

        clock.advance(1_000_000);
        assert_eq!(store.purge_finished(10_001).await.unwrap(), 1);
        assert_eq!(store.purge_finished(10_001).await.unwrap(), 0);
    }
}
