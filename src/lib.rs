//! `chime` — a distributed, database-backed job scheduler.
//!
//! Multiple process instances share one job table in a transactional
//! store and cooperatively execute scheduled work. Each node scans for
//! jobs whose due time has arrived, atomically claims a worker permit
//! with a conditional single-row update, runs the registered handler,
//! and reschedules or removes the job according to its recurrence
//! specification. At-least-once execution per scheduled occurrence,
//! at-most-one concurrent holder per permit.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker;

pub use config::{DefaultOverrides, JobDefaults, SchedulerConfig};
pub use error::{ChimeError, Result};
pub use scheduler::{
    record_id, HandlerError, Job, JobContext, JobHandler, JobRecord, JobSelector, JobSpec, Meta,
    ScanRequest, ScheduleOptions, Scheduler, TypeOptions,
};
pub use store::{JobStore, SqliteStore};
pub use worker::ident::{create_worker_id, encode_expired_threshold};
