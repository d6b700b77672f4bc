//! Test harness for scheduler integration tests.
//!
//! Provides a shared in-memory store, schedulers with short timings,
//! and counting handlers for observing executions.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chime::{
    HandlerError, JobContext, JobHandler, Scheduler, SchedulerConfig, SqliteStore, TypeOptions,
};

/// Scheduler configuration with short timings for faster tests.
pub fn test_config() -> SchedulerConfig {
    SchedulerConfig::new()
        .with_concurrency(2)
        .with_lock_duration_ms(60_000)
        .with_idle_time_ms(50)
}

/// A private in-memory job collection shared by every scheduler handle
/// cloned from it.
pub fn shared_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"))
}

/// A scheduler node on `store` with the test timings.
pub fn test_scheduler(store: &Arc<SqliteStore>) -> Scheduler {
    Scheduler::new(store.clone(), test_config())
}

/// A scheduler node on `store` with explicit config.
pub fn test_scheduler_with(store: &Arc<SqliteStore>, config: SchedulerConfig) -> Scheduler {
    Scheduler::new(store.clone(), config)
}

/// Handler that counts its invocations.
pub fn counting_handler(counter: Arc<AtomicUsize>) -> impl JobHandler + 'static {
    move |_job: JobContext| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        }
    }
}

/// Handler that records the external id of every job it runs.
pub fn recording_handler(seen: Arc<Mutex<Vec<String>>>) -> impl JobHandler + 'static {
    move |job: JobContext| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(job.job.id);
            Ok::<(), HandlerError>(())
        }
    }
}

/// Handler that counts, then sleeps, simulating slow work.
pub fn slow_handler(counter: Arc<AtomicUsize>, sleep_ms: u64) -> impl JobHandler + 'static {
    move |_job: JobContext| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            Ok::<(), HandlerError>(())
        }
    }
}

/// Register a counting handler for `job_type` and return its counter.
pub fn define_counting(scheduler: &Scheduler, job_type: &str) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    scheduler.define(
        job_type,
        TypeOptions::default(),
        counting_handler(counter.clone()),
    );
    counter
}

/// Poll `check` every 10ms until it holds or `deadline_ms` passes.
pub async fn wait_until(deadline_ms: u64, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
