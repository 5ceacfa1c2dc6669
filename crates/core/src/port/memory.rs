// In-memory store (tests and embedded single-process use)
// One mutex per collection: every operation is a single critical section,
// which gives the same per-document compare-and-set guarantees as the SQL adapter.

use crate::domain::{
    ConcurrencyLock, DeadLetterEntry, DeadLetterId, Job, JobId, JobStatus, LockAcquisition,
    ReasonCount,
};
use crate::error::{AppError, Result};
use crate::port::{ClaimRequest, DeadLetterStore, JobStore, LockStore, TimeProvider};
use crate::port::DEFAULT_REASON_QUERY_LIMIT;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct InMemoryStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    dead_letters: Mutex<Vec<DeadLetterEntry>>,
    locks: Mutex<HashMap<String, ConcurrencyLock>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryStore {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            dead_letters: Mutex::new(Vec::new()),
            locks: Mutex::new(HashMap::new()),
            time_provider,
        }
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<JobId, Job>>> {
        self.jobs
            .lock()
            .map_err(|_| AppError::Internal("job collection poisoned".to_string()))
    }

    fn dead_letters(&self) -> Result<MutexGuard<'_, Vec<DeadLetterEntry>>> {
        self.dead_letters
            .lock()
            .map_err(|_| AppError::Internal("dead letter collection poisoned".to_string()))
    }

    fn locks(&self) -> Result<MutexGuard<'_, HashMap<String, ConcurrencyLock>>> {
        self.locks
            .lock()
            .map_err(|_| AppError::Internal("lock collection poisoned".to_string()))
    }

    /// Apply `f` to a job still leased by `owner`
    fn with_leased_job<T>(
        &self,
        id: &JobId,
        owner: &str,
        f: impl FnOnce(&mut Job, i64) -> T,
    ) -> Result<Option<T>> {
        let now = self.time_provider.now_millis();
        let mut jobs = self.jobs()?;
        match jobs.get_mut(id) {
            Some(job) if job.status.is_leased() && job.locked_by.as_deref() == Some(owner) => {
                job.updated_at = now;
                Ok(Some(f(job, now)))
            }
            _ => Ok(None),
        }
    }
}

fn newest_first(entries: &mut [DeadLetterEntry]) {
    entries.sort_by(|a, b| b.failed_at.cmp(&a.failed_at).then_with(|| b.id.cmp(&a.id)));
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs()?;
        if jobs.contains_key(&job.id) {
            return Err(AppError::Database(format!(
                "Unique constraint violation: job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs()?.get(id).cloned())
    }

    async fn claim_batch(&self, request: &ClaimRequest) -> Result<Vec<Job>> {
        let mut jobs = self.jobs()?;

        let mut eligible: Vec<&mut Job> = jobs
            .values_mut()
            .filter(|job| job.queue == request.queue && job.is_claimable(request.now))
            .collect();
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.available_at.cmp(&b.available_at))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let limit = request.limit.max(0) as usize;
        let mut claimed = Vec::with_capacity(limit.min(eligible.len()));
        for job in eligible.into_iter().take(limit) {
            job.status = JobStatus::Claimed;
            job.locked_by = Some(request.owner.clone());
            job.locked_until = Some(request.now + request.lease_ms);
            job.updated_at = request.now;
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn mark_processing(&self, id: &JobId, owner: &str, locked_until: i64) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let mut jobs = self.jobs()?;
        match jobs.get_mut(id) {
            Some(job)
                if job.status.is_leased()
                    && job.locked_by.as_deref() == Some(owner)
                    && job.locked_until.is_some_and(|until| until >= now) =>
            {
                job.status = JobStatus::Processing;
                job.locked_until = Some(locked_until);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend_lease(&self, id: &JobId, owner: &str, locked_until: i64) -> Result<bool> {
        Ok(self
            .with_leased_job(id, owner, |job, _| job.locked_until = Some(locked_until))?
            .is_some())
    }

    async fn settle_complete(&self, id: &JobId, owner: &str) -> Result<bool> {
        Ok(self
            .with_leased_job(id, owner, |job, _| {
                job.status = JobStatus::Completed;
                job.locked_by = None;
                job.locked_until = None;
            })?
            .is_some())
    }

    async fn settle_retry(
        &self,
        id: &JobId,
        owner: &str,
        available_at: i64,
        error: &str,
    ) -> Result<bool> {
        Ok(self
            .with_leased_job(id, owner, |job, _| {
                job.status = JobStatus::Pending;
                job.attempt += 1;
                job.available_at = available_at;
                job.last_error = Some(error.to_string());
                job.locked_by = None;
                job.locked_until = None;
            })?
            .is_some())
    }

    async fn settle_failed(&self, id: &JobId, owner: &str, error: &str) -> Result<Option<Job>> {
        let failed = self.with_leased_job(id, owner, |job, _| {
            job.status = JobStatus::Failed;
            job.attempt += 1;
            job.last_error = Some(error.to_string());
            job.locked_until = None;
            job.clone()
        })?;
        if failed.is_some() {
            return Ok(failed);
        }

        Ok(self
            .jobs()?
            .get(id)
            .filter(|job| job.status == JobStatus::Failed && job.locked_by.as_deref() == Some(owner))
            .cloned())
    }

    async fn reclaim_expired(&self, now: i64) -> Result<u64> {
        let mut jobs = self.jobs()?;
        let mut reclaimed = 0;
        for job in jobs.values_mut() {
            let expired = job.locked_until.map(|until| until < now).unwrap_or(true);
            if job.status.is_leased() && expired {
                job.status = JobStatus::Pending;
                job.locked_by = None;
                job.locked_until = None;
                job.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn count_by_status(&self, queue: &str) -> Result<HashMap<JobStatus, i64>> {
        let mut counts = HashMap::new();
        for job in self.jobs()?.values().filter(|job| job.queue == queue) {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        let mut jobs = self.jobs()?;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_finished() && job.updated_at < finished_before));
        Ok((before - jobs.len()) as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.jobs()?.clear();
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, entry: &DeadLetterEntry) -> Result<bool> {
        let mut entries = self.dead_letters()?;
        if entries.iter().any(|e| e.job_id == entry.job_id) {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        Ok(self.dead_letters()?.iter().find(|e| &e.id == id).cloned())
    }

    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<DeadLetterEntry>> {
        Ok(self
            .dead_letters()?
            .iter()
            .find(|e| &e.job_id == job_id)
            .cloned())
    }

    async fn find_by_original_job_id(&self, original_job_id: &JobId) -> Result<Vec<DeadLetterEntry>> {
        let mut chain: Vec<_> = self
            .dead_letters()?
            .iter()
            .filter(|e| &e.original_job_id == original_job_id)
            .cloned()
            .collect();
        chain.sort_by_key(|e| e.failed_at);
        Ok(chain)
    }

    async fn find_recent_failures_page(&self, limit: i64, offset: i64) -> Result<Vec<DeadLetterEntry>> {
        let mut entries = self.dead_letters()?.clone();
        newest_first(&mut entries);
        Ok(entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn find_by_reason(&self, reason: &str, limit: Option<i64>) -> Result<Vec<DeadLetterEntry>> {
        let limit = limit.unwrap_or(DEFAULT_REASON_QUERY_LIMIT).max(0) as usize;
        let mut entries: Vec<_> = self
            .dead_letters()?
            .iter()
            .filter(|e| e.reason == reason)
            .cloned()
            .collect();
        newest_first(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn mark_as_reprocessed(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        let now = self.time_provider.now_millis();
        let mut entries = self.dead_letters()?;
        Ok(entries.iter_mut().find(|e| &e.id == id).map(|entry| {
            if !entry.reprocessed {
                entry.reprocessed = true;
                entry.reprocessed_at = Some(now);
            }
            entry.clone()
        }))
    }

    async fn get_stats_by_reason(&self) -> Result<Vec<ReasonCount>> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for entry in self.dead_letters()?.iter() {
            *counts.entry(entry.reason.clone()).or_insert(0) += 1;
        }
        let mut stats: Vec<_> = counts
            .into_iter()
            .map(|(reason, count)| ReasonCount::new(reason, count))
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
        Ok(stats)
    }

    async fn cleanup_old_entries(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = self
            .time_provider
            .now_millis()
            .saturating_sub(older_than_days.saturating_mul(MILLIS_PER_DAY));
        let mut entries = self.dead_letters()?;
        let before = entries.len();
        entries.retain(|e| e.reprocessed || e.failed_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.dead_letters()?.len() as i64)
    }

    async fn clear(&self) -> Result<()> {
        self.dead_letters()?.clear();
        Ok(())
    }
}

#[async_trait]
impl LockStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn try_acquire(&self, scope: &str, owner: &str, lease_ms: i64) -> Result<LockAcquisition> {
        let now = self.time_provider.now_millis();
        let mut locks = self.locks()?;
        if let Some(current) = locks.get(scope) {
            if current.is_live(now) && current.owner_id != owner {
                return Ok(LockAcquisition::AlreadyLocked);
            }
        }
        let lock = ConcurrencyLock {
            scope: scope.to_string(),
            owner_id: owner.to_string(),
            acquired_at: now,
            expires_at: now + lease_ms,
        };
        locks.insert(scope.to_string(), lock.clone());
        Ok(LockAcquisition::Acquired(lock))
    }

    async fn extend(&self, scope: &str, owner: &str, lease_ms: i64) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let mut locks = self.locks()?;
        match locks.get_mut(scope) {
            Some(lock) if lock.owner_id == owner && lock.is_live(now) => {
                lock.expires_at = now + lease_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, scope: &str, owner: &str) -> Result<bool> {
        let mut locks = self.locks()?;
        match locks.get(scope) {
            Some(lock) if lock.owner_id == owner => {
                locks.remove(scope);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find(&self, scope: &str) -> Result<Option<ConcurrencyLock>> {
        Ok(self.locks()?.get(scope).cloned())
    }

    async fn clear(&self) -> Result<()> {
        self.locks()?.clear();
        Ok(())
    }
}
