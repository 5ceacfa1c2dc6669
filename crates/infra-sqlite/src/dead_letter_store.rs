// SQLite DeadLetterStore Implementation

use crate::error::map_sqlx_error;
use crate::migration::run_migrations;
use async_trait::async_trait;
use courier_core::domain::{DeadLetterEntry, DeadLetterId, JobId, JobPayload, JobType, ReasonCount};
use courier_core::error::Result;
use courier_core::port::{DeadLetterStore, TimeProvider, DEFAULT_REASON_QUERY_LIMIT};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct SqliteDeadLetterStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteDeadLetterStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn fetch_many(&self, sql: &str, key: &str, limit: i64, offset: i64) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(sql)
            .bind(key)
            .bind(limit.max(0))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(DeadLetterRow::into_entry).collect()
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<DeadLetterEntry>> {
        let sql = format!("SELECT * FROM dead_letter_queue WHERE {} = ?", column);
        let row = sqlx::query_as::<_, DeadLetterRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(DeadLetterRow::into_entry).transpose()
    }
}

#[async_trait]
impl DeadLetterStore for SqliteDeadLetterStore {
    async fn initialize(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    async fn insert(&self, entry: &DeadLetterEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO dead_letter_queue (
                id, job_id, original_job_id, queue, job_type, payload,
                reason, failed_at, attempt, max_attempts, priority,
                reprocessed, reprocessed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.job_id)
        .bind(&entry.original_job_id)
        .bind(&entry.queue)
        .bind(entry.job_type.as_str())
        .bind(entry.payload.as_value().to_string())
        .bind(&entry.reason)
        .bind(entry.failed_at)
        .bind(entry.attempt)
        .bind(entry.max_attempts)
        .bind(entry.priority)
        .bind(entry.reprocessed)
        .bind(entry.reprocessed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            debug!(job_id = %entry.job_id, "DLQ entry already present for job");
        }
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        self.fetch_one_by("id", id).await
    }

    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<DeadLetterEntry>> {
        self.fetch_one_by("job_id", job_id).await
    }

    async fn find_by_original_job_id(&self, original_job_id: &JobId) -> Result<Vec<DeadLetterEntry>> {
        self.fetch_many(
            "SELECT * FROM dead_letter_queue WHERE original_job_id = ? \
             ORDER BY failed_at ASC, id ASC LIMIT ? OFFSET ?",
            original_job_id,
            -1,
            0,
        )
        .await
    }

    async fn find_recent_failures_page(&self, limit: i64, offset: i64) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            "SELECT * FROM dead_letter_queue ORDER BY failed_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DeadLetterRow::into_entry).collect()
    }

    async fn find_by_reason(&self, reason: &str, limit: Option<i64>) -> Result<Vec<DeadLetterEntry>> {
        self.fetch_many(
            "SELECT * FROM dead_letter_queue WHERE reason = ? \
             ORDER BY failed_at DESC, id DESC LIMIT ? OFFSET ?",
            reason,
            limit.unwrap_or(DEFAULT_REASON_QUERY_LIMIT),
            0,
        )
        .await
    }

    async fn mark_as_reprocessed(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        // Guarded on `reprocessed = 0`: the first call wins, later calls change nothing
        sqlx::query(
            "UPDATE dead_letter_queue SET reprocessed = 1, reprocessed_at = ? \
             WHERE id = ? AND reprocessed = 0",
        )
        .bind(self.time_provider.now_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.find_by_id(id).await
    }

    async fn get_stats_by_reason(&self) -> Result<Vec<ReasonCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT reason, COUNT(*) AS count
            FROM dead_letter_queue
            GROUP BY reason
            ORDER BY count DESC, reason ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(reason, count)| ReasonCount::new(reason, count))
            .collect())
    }

    async fn cleanup_old_entries(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = self
            .time_provider
            .now_millis()
            .saturating_sub(older_than_days.saturating_mul(MILLIS_PER_DAY));
        let result =
            sqlx::query("DELETE FROM dead_letter_queue WHERE failed_at < ? AND reprocessed = 0")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM dead_letter_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM dead_letter_queue")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: String,
    job_id: String,
    original_job_id: String,
    queue: String,
    job_type: String,
    payload: String,
    reason: String,
    failed_at: i64,
    attempt: i32,
    max_attempts: i32,
    priority: i32,
    reprocessed: bool,
    reprocessed_at: Option<i64>,
}

impl DeadLetterRow {
    fn into_entry(self) -> Result<DeadLetterEntry> {
        Ok(DeadLetterEntry {
            payload: JobPayload::new(serde_json::from_str(&self.payload)?),
            id: self.id,
            job_id: self.job_id,
            original_job_id: self.original_job_id,
            queue: self.queue,
            job_type: JobType::new(self.job_type),
            reason: self.reason,
            failed_at: self.failed_at,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            priority: self.priority,
            reprocessed: self.reprocessed,
            reprocessed_at: self.reprocessed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;
    use courier_core::domain::Job;
    use courier_core::port::time_provider::mocks::MockTimeProvider;
    use serde_json::json;

    async fn setup() -> (Arc<MockTimeProvider>, SqliteDeadLetterStore) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let clock = Arc::new(MockTimeProvider::new(100 * MILLIS_PER_DAY));
        let store = SqliteDeadLetterStore::new(pool, clock.clone());
        store.initialize().await.unwrap();
        (clock, store)
    }

    fn entry(id: &str, job_id: &str, reason: &str, failed_at: i64) -> DeadLetterEntry {
        let mut job = Job::new(
            job_id,
            0,
            "app-queue",
            JobType::new("email.send"),
            JobPayload::new(json!({"to": "a@example.com"})),
        );
        job.attempt = 3;
        DeadLetterEntry::from_job(id, &job, reason, failed_at)
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_job() {
        let (_, store) = setup().await;
        assert!(store.insert(&entry("d1", "j1", "timeout", 10)).await.unwrap());
        assert!(!store.insert(&entry("d2", "j1", "timeout", 20)).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        let found = store.find_by_job_id(&"j1".to_string()).await.unwrap().unwrap();
        assert_eq!(found.id, "d1");
        assert_eq!(found.attempt, 3);
        assert_eq!(found.payload.as_value(), &json!({"to": "a@example.com"}));
    }

    #[tokio::test]
    async fn test_recent_failures_and_reason_queries() {
        let (_, store) = setup().await;
        store.insert(&entry("d1", "j1", "timeout", 10)).await.unwrap();
        store.insert(&entry("d2", "j2", "validation", 20)).await.unwrap();
        store.insert(&entry("d3", "j3", "timeout", 30)).await.unwrap();

        let recent = store.find_recent_failures(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["d3", "d2"]);

        let page = store.find_recent_failures_page(2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "d1");

        let timeouts = store.find_by_reason("timeout", None).await.unwrap();
        let ids: Vec<_> = timeouts.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["d3", "d1"]);
        assert_eq!(store.find_by_reason("timeout", Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_by_reason_sorted() {
        let (_, store) = setup().await;
        store.insert(&entry("d1", "j1", "validation", 1)).await.unwrap();
        for i in 2..5 {
            store
                .insert(&entry(&format!("d{}", i), &format!("j{}", i), "timeout", i))
                .await
                .unwrap();
        }

        let stats = store.get_stats_by_reason().await.unwrap();
        assert_eq!(
            stats,
            vec![ReasonCount::new("timeout", 3), ReasonCount::new("validation", 1)]
        );
    }

    #[tokio::test]
    async fn test_mark_as_reprocessed_once() {
        let (clock, store) = setup().await;
        store.insert(&entry("d1", "j1", "timeout", 10)).await.unwrap();

        let first = store.mark_as_reprocessed(&"d1".to_string()).await.unwrap().unwrap();
        assert!(first.reprocessed);
        let stamped = first.reprocessed_at;
        assert_eq!(stamped, Some(100 * MILLIS_PER_DAY));

        clock.advance(5_000);
        let second = store.mark_as_reprocessed(&"d1".to_string()).await.unwrap().unwrap();
        assert_eq!(second.reprocessed_at, stamped);

        assert!(store.mark_as_reprocessed(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_reprocessed_and_recent() {
        let (_, store) = setup().await;
        let old = 50 * MILLIS_PER_DAY;
        let recent = 95 * MILLIS_PER_DAY;
        store.insert(&entry("old", "j1", "timeout", old)).await.unwrap();
        store.insert(&entry("old-fixed", "j2", "timeout", old)).await.unwrap();
        store.insert(&entry("recent", "j3", "timeout", recent)).await.unwrap();
        store.mark_as_reprocessed(&"old-fixed".to_string()).await.unwrap();

        assert_eq!(store.cleanup_old_entries(30).await.unwrap(), 1);
        assert!(store.find_by_id(&"old".to_string()).await.unwrap().is_none());
        assert!(store.find_by_id(&"old-fixed".to_string()).await.unwrap().is_some());
        assert!(store.find_by_id(&"recent".to_string()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_with_huge_retention_removes_nothing() {
        let (_, store) = setup().await;
        store.insert(&entry("old", "j1", "timeout", 0)).await.unwrap();

        assert_eq!(store.cleanup_old_entries(i64::MAX).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lineage_query_oldest_first() {
        let (_, store) = setup().await;
        let mut second = entry("d2", "j2", "timeout", 20);
        second.original_job_id = "j1".into();
        store.insert(&second).await.unwrap();
        store.insert(&entry("d1", "j1", "timeout", 10)).await.unwrap();
        store.insert(&entry("other", "j9", "timeout", 5)).await.unwrap();

        let chain = store.find_by_original_job_id(&"j1".to_string()).await.unwrap();
        let ids: Vec<_> = chain.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }
}
