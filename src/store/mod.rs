//! Persistence contract.
//!
//! The claim protocol needs very little from the store: CRUD on job
//! records, the two due-job candidate queries, and conditional
//! single-row updates whose predicate includes the exact prior value of
//! the contended fields (`permits`, and `workers` compared as a full
//! sequence including order). No multi-row transaction is required.

pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::scheduler::JobRecord;

pub use sqlite::SqliteStore;

/// One arm of the expired-lease candidate query: jobs of `job_type`
/// holding at least one worker id at or below `threshold`.
#[derive(Debug, Clone)]
pub struct ExpiredClause {
    pub job_type: String,
    /// Threshold id from `encode_expired_threshold(now - lock_duration)`.
    pub threshold: String,
}

/// Abstract interface to the job collection.
pub trait JobStore: Send + Sync {
    /// Insert a fresh record. Fails with `DuplicateKey` when a record
    /// with the same id (or the same `(type, external id)` pair) exists.
    fn insert(&self, record: &JobRecord) -> Result<()>;

    /// Fetch a record by its (hashed) record id.
    fn get(&self, record_id: &str) -> Result<Option<JobRecord>>;

    /// Delete records matching the id and/or type selector; returns the
    /// number removed. Callers validate that at least one is present.
    fn delete(&self, record_id: Option<&str>, job_type: Option<&str>) -> Result<usize>;

    /// All records, in creation order.
    fn list(&self) -> Result<Vec<JobRecord>>;

    /// First candidate query: the highest-priority due job of a
    /// registered type with a free permit not already held by
    /// `worker_id`.
    fn find_idle(
        &self,
        now: DateTime<Utc>,
        job_types: &[String],
        worker_id: &str,
        record_id: Option<&str>,
    ) -> Result<Option<JobRecord>>;

    /// Second candidate query: the highest-priority due job holding at
    /// least one expired lease, per-type thresholds supplied by the
    /// caller, and not already held by `worker_id`.
    fn find_expired(
        &self,
        now: DateTime<Utc>,
        clauses: &[ExpiredClause],
        worker_id: &str,
        record_id: Option<&str>,
    ) -> Result<Option<JobRecord>>;

    /// The claim: conditionally move the record from its observed
    /// `(permits, workers)` to the claimed state. Returns `false` when
    /// another node won the race.
    fn try_claim(
        &self,
        previous: &JobRecord,
        workers: &[String],
        permits: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Post-run reschedule: write the rescheduled state, guarded by
    /// `due <= new_due` so a more recent claim's reschedule is never
    /// overwritten. Returns `false` when the guard rejected the write.
    fn reschedule(
        &self,
        record_id: &str,
        job_type: &str,
        schedule: Option<&str>,
        new_due: DateTime<Utc>,
        completed: DateTime<Utc>,
    ) -> Result<bool>;

    /// Exhausted schedule: remove the record outright.
    fn remove_exhausted(&self, record_id: &str, job_type: &str) -> Result<bool>;

    /// Permit release: pull `worker_id` from the record's workers and return
    /// its permit (unless permits are unlimited). A no-op when the
    /// worker id is no longer present.
    fn release(
        &self,
        record_id: &str,
        job_type: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;
}
