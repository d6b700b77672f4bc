//! The scheduler core: public API façade, type registry, schedule
//! calculator, claim engine, and scan scheduling.

mod claim;
pub mod job;
pub mod registry;
pub mod scan;
pub mod schedule;

pub use job::{record_id, Job, JobContext, JobRecord, JobSpec, Meta};
pub use registry::{HandlerError, JobHandler, TypeOptions};
pub use scan::ScanRequest;

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{ChimeError, Result};
use crate::store::JobStore;
use registry::TypeRegistry;

/// Options accepted by [`Scheduler::schedule`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleOptions {
    /// Emit a targeted scan for the new job when it is already due.
    pub immediate: bool,
}

/// Selector accepted by [`Scheduler::unschedule`]; at least one field
/// must be set.
#[derive(Debug, Clone, Default)]
pub struct JobSelector {
    /// External job id.
    pub id: Option<String>,
    pub job_type: Option<String>,
}

impl JobSelector {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn job_type(job_type: impl Into<String>) -> Self {
        Self {
            job_type: Some(job_type.into()),
            ..Default::default()
        }
    }
}

struct SchedulerInner {
    config: SchedulerConfig,
    registry: Arc<TypeRegistry>,
    store: Arc<dyn JobStore>,
    scan_tx: mpsc::UnboundedSender<ScanRequest>,
    scan_rx: Mutex<Option<mpsc::UnboundedReceiver<ScanRequest>>>,
    cancel: CancellationToken,
}

/// One scheduler node.
///
/// Carries the configuration, the process-local type registry, the
/// store handle, and the scan channel. Clones share the same node.
/// Several nodes pointed at the same store cooperate through the claim
/// protocol alone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, config: SchedulerConfig) -> Self {
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(TypeRegistry::new(config.lock_duration_ms, config.defaults));
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                registry,
                store,
                scan_tx,
                scan_rx: Mutex::new(Some(scan_rx)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register a handler for a job type on this node. A later
    /// registration for the same type supersedes the earlier one.
    /// Register every type before calling [`start`](Self::start).
    pub fn define(
        &self,
        job_type: &str,
        options: TypeOptions,
        handler: impl JobHandler + 'static,
    ) {
        self.inner
            .registry
            .define(job_type, options, Arc::new(handler));
        debug!(job_type, "Job type defined");
    }

    /// Insert a job record.
    ///
    /// Missing fields are filled from the per-type and global defaults,
    /// and a missing id is generated. With `immediate` set and the job
    /// already due, a targeted scan is emitted so the job runs without
    /// waiting for the next idle rescan.
    pub fn schedule(&self, spec: JobSpec, options: ScheduleOptions) -> Result<JobRecord> {
        if spec.job_type.is_empty() {
            return Err(ChimeError::InvalidJob("missing job type".to_string()));
        }

        let now = Utc::now();
        let defaults = self.inner.registry.defaults_for(&spec.job_type);
        let job = Job {
            id: spec.id.unwrap_or_else(|| self.generate_job_id()),
            job_type: spec.job_type,
            schedule: spec.schedule,
            priority: spec.priority.unwrap_or(defaults.priority),
            concurrency: spec.concurrency.unwrap_or(defaults.concurrency),
            data: spec.data,
        };
        let due = schedule::first_due(job.schedule.as_deref(), now)?;
        let record = JobRecord::new(job, due, now);
        self.inner.store.insert(&record)?;
        info!(
            job_id = %record.job.id,
            job_type = %record.job.job_type,
            due = %due,
            "Job scheduled"
        );

        if options.immediate && due <= now {
            self.request_scan(ScanRequest::targeted(record.id.clone()));
        }
        Ok(record)
    }

    /// Delete records matching the selector; returns the number removed.
    pub fn unschedule(&self, selector: &JobSelector) -> Result<usize> {
        if selector.id.is_none() && selector.job_type.is_none() {
            return Err(ChimeError::InvalidArguments(
                "unschedule requires an id or a job type".to_string(),
            ));
        }
        let hashed = selector.id.as_deref().map(record_id);
        let removed = self
            .inner
            .store
            .delete(hashed.as_deref(), selector.job_type.as_deref())?;
        info!(removed, "Jobs unscheduled");
        Ok(removed)
    }

    /// Fetch the record for an external job id.
    pub fn get_job(&self, external_id: &str) -> Result<JobRecord> {
        self.inner
            .store
            .get(&record_id(external_id))?
            .ok_or_else(|| ChimeError::NotFound(external_id.to_string()))
    }

    /// A fresh external job id.
    pub fn generate_job_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Run one worker session inline and return the number of runs it
    /// performed. This is the synchronous form of a scan event: the
    /// dispatcher does exactly this for every request, plus the idle
    /// re-arm.
    pub async fn scan_once(&self, request: &ScanRequest) -> Result<usize> {
        let types = self.inner.registry.snapshot();
        claim::run_worker_session(self.inner.store.as_ref(), &types, request.id.as_deref()).await
    }

    /// Enqueue a scan request for the dispatcher.
    pub fn request_scan(&self, request: ScanRequest) {
        if self.inner.scan_tx.send(request).is_err() {
            warn!("Scan dispatcher is gone, scan request dropped");
        }
    }

    /// Start this node: schedule the bootstrap jobs (records already in
    /// the store are fine), spawn the scan dispatcher, and seed one
    /// scan event per configured worker session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let Some(scan_rx) = self.inner.scan_rx.lock().unwrap().take() else {
            warn!("Scheduler already started");
            return Ok(());
        };

        for spec in self.inner.config.jobs.clone() {
            match self.schedule(spec, ScheduleOptions::default()) {
                Ok(_) => {}
                Err(ChimeError::DuplicateKey(job)) => {
                    debug!(%job, "Bootstrap job already present");
                }
                Err(err) => return Err(err),
            }
        }

        tokio::spawn(scan::run_dispatcher(
            self.inner.store.clone(),
            self.inner.registry.clone(),
            self.inner.scan_tx.clone(),
            scan_rx,
            self.inner.config.concurrency,
            self.inner.config.idle_time_ms,
            self.inner.cancel.clone(),
        ));

        for _ in 0..self.inner.config.concurrency {
            self.request_scan(ScanRequest::default());
        }
        info!(
            concurrency = self.inner.config.concurrency,
            idle_time_ms = self.inner.config.idle_time_ms,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop the dispatcher and every idle re-arm. Running handlers are
    /// not aborted; their permits are reclaimed by lease expiry if the
    /// process exits mid-run.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        info!("Scheduler stopped");
    }
}
