//! Process-local job type registry.
//!
//! A node only executes jobs whose type is registered on it; other
//! nodes may still schedule such jobs. Register every type before the
//! first scan event — redefinition replaces the earlier entry, and the
//! new handler is picked up by the next worker session.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::{DefaultOverrides, JobDefaults};
use crate::scheduler::job::JobContext;

/// Error type produced by job handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered job handler.
///
/// Implemented automatically for async closures taking a [`JobContext`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: JobContext) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    async fn run(&self, job: JobContext) -> std::result::Result<(), HandlerError> {
        (self)(job).await
    }
}

/// Options accepted by `Scheduler::define`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeOptions {
    /// Maximum wall time a worker may hold a permit for this type before
    /// another worker may steal it. Falls back to the configured global.
    pub lock_duration_ms: Option<u64>,
    /// Per-type defaults, shallow-merged over the global defaults.
    pub defaults: DefaultOverrides,
}

#[derive(Clone)]
struct TypeEntry {
    handler: Arc<dyn JobHandler>,
    lock_duration_ms: u64,
    defaults: JobDefaults,
}

/// An immutable view of one registered type, captured for the duration
/// of a worker session.
#[derive(Clone)]
pub(crate) struct TypeSnapshot {
    pub name: String,
    pub lock_duration_ms: u64,
    pub handler: Arc<dyn JobHandler>,
}

pub(crate) struct TypeRegistry {
    global_lock_duration_ms: u64,
    global_defaults: JobDefaults,
    types: RwLock<HashMap<String, TypeEntry>>,
}

impl TypeRegistry {
    pub fn new(global_lock_duration_ms: u64, global_defaults: JobDefaults) -> Self {
        Self {
            global_lock_duration_ms,
            global_defaults,
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) a job type. Later registrations win.
    pub fn define(&self, job_type: &str, options: TypeOptions, handler: Arc<dyn JobHandler>) {
        let entry = TypeEntry {
            handler,
            lock_duration_ms: options
                .lock_duration_ms
                .unwrap_or(self.global_lock_duration_ms),
            defaults: self.global_defaults.merged(options.defaults),
        };
        self.types
            .write()
            .unwrap()
            .insert(job_type.to_string(), entry);
    }

    /// Effective defaults for `job_type`: the type's merged defaults if
    /// it is registered here, the global defaults otherwise.
    pub fn defaults_for(&self, job_type: &str) -> JobDefaults {
        self.types
            .read()
            .unwrap()
            .get(job_type)
            .map(|entry| entry.defaults)
            .unwrap_or(self.global_defaults)
    }

    /// Capture the registered types for one worker session.
    pub fn snapshot(&self) -> Vec<TypeSnapshot> {
        self.types
            .read()
            .unwrap()
            .iter()
            .map(|(name, entry)| TypeSnapshot {
                name: name.clone(),
                lock_duration_ms: entry.lock_duration_ms,
                handler: entry.handler.clone(),
            })
            .collect()
    }
}
