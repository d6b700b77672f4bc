use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute the stable record id for an external job id.
///
/// The record id is the primary key of the job table; hashing keeps it
/// a fixed-width, index-friendly string regardless of what callers use
/// as external ids.
pub fn record_id(external_id: &str) -> String {
    hex::encode(Sha256::digest(external_id.as_bytes()))
}

/// The resolved job document nested inside a [`JobRecord`].
///
/// Field names are wire-frozen; existing deployments store exactly this
/// layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// External id (caller-supplied or generated).
    pub id: String,
    /// Job type name; only nodes that registered this type execute it.
    #[serde(rename = "type")]
    pub job_type: String,
    /// ISO 8601 interval or instant; `None` means "run once, now".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Smaller numbers are claimed first.
    pub priority: i64,
    /// Maximum simultaneous workers, `-1` for unlimited.
    pub concurrency: i64,
    /// Opaque payload forwarded to the handler.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Audit timestamps on a job record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Meta {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// One persisted document per scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Stable hash of the external id; primary key.
    pub id: String,
    pub job: Job,
    /// Instant of next eligibility, or `None` once the schedule is spent.
    pub due: Option<DateTime<Utc>>,
    /// Remaining permits: `job.concurrency - active workers`, `-1` if unlimited.
    pub permits: i64,
    /// Worker ids currently holding this job, in claim order.
    pub workers: Vec<String>,
    /// Instant of the last completed run, if any.
    pub completed: Option<DateTime<Utc>>,
    pub meta: Meta,
}

impl JobRecord {
    /// Build a fresh record for `job` with its first due instant.
    pub fn new(job: Job, due: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let permits = job.concurrency;
        Self {
            id: record_id(&job.id),
            job,
            due: Some(due),
            permits,
            workers: Vec::new(),
            completed: None,
            meta: Meta {
                created: now,
                updated: now,
            },
        }
    }
}

/// Caller-facing job description accepted by `Scheduler::schedule` and
/// bootstrap job lists. Unset fields are filled from the global and
/// per-type defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl JobSpec {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// The claimed payload handed to a job handler.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: Job,
    /// The due instant that made this run eligible.
    pub due: Option<DateTime<Utc>>,
    /// Id of the worker session holding the permit for this run.
    pub worker_id: String,
}
