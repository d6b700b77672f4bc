use serde::{Deserialize, Serialize};

use crate::scheduler::JobSpec;

/// Default number of concurrent worker sessions per process.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Default per-type lock duration in milliseconds.
pub const DEFAULT_LOCK_DURATION_MS: u64 = 600_000;
/// Default delay between idle rescan events in milliseconds.
pub const DEFAULT_IDLE_TIME_MS: u64 = 10_000;

/// Resolved per-job defaults applied when neither the caller nor the
/// job type supplies a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefaults {
    /// Job priority; smaller numbers are claimed first.
    pub priority: i64,
    /// Maximum simultaneous workers per job; `-1` means unlimited.
    pub concurrency: i64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            priority: 0,
            concurrency: 1,
        }
    }
}

impl JobDefaults {
    /// Shallow-merge `overrides` on top of these defaults.
    pub fn merged(self, overrides: DefaultOverrides) -> Self {
        Self {
            priority: overrides.priority.unwrap_or(self.priority),
            concurrency: overrides.concurrency.unwrap_or(self.concurrency),
        }
    }
}

/// Partial defaults carried by a job type registration; unset fields
/// fall through to the global [`JobDefaults`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DefaultOverrides {
    pub priority: Option<i64>,
    pub concurrency: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker sessions this process runs concurrently.
    pub concurrency: usize,
    /// Default lock duration in milliseconds for types that don't set one.
    pub lock_duration_ms: u64,
    /// Global per-job defaults.
    pub defaults: JobDefaults,
    /// Delay in milliseconds before an idle scan re-arms itself.
    pub idle_time_ms: u64,
    /// Jobs to schedule on startup; duplicates already in the store are ignored.
    pub jobs: Vec<JobSpec>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            lock_duration_ms: DEFAULT_LOCK_DURATION_MS,
            defaults: JobDefaults::default(),
            idle_time_ms: DEFAULT_IDLE_TIME_MS,
            jobs: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_lock_duration_ms(mut self, lock_duration_ms: u64) -> Self {
        self.lock_duration_ms = lock_duration_ms;
        self
    }

    pub fn with_defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_idle_time_ms(mut self, idle_time_ms: u64) -> Self {
        self.idle_time_ms = idle_time_ms;
        self
    }

    pub fn with_job(mut self, job: JobSpec) -> Self {
        self.jobs.push(job);
        self
    }
}
