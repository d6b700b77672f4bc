//! Scan scheduling.
//!
//! Scan requests flow through a single channel; a dispatcher task
//! spawns one worker session per request, bounded by the configured
//! concurrency. Untargeted requests re-arm themselves after the idle
//! time, so the system keeps polling for due work without a periodic
//! timer of its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::scheduler::claim;
use crate::scheduler::registry::TypeRegistry;
use crate::store::JobStore;

/// A request for one pass of the claim engine.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Restrict the scan to a single record id. A targeted scan that
    /// never claims its record fails with `NotFound`.
    pub id: Option<String>,
    /// Emit a fresh untargeted scan this many milliseconds after the
    /// worker session terminates.
    pub reschedule_ms: Option<u64>,
}

impl ScanRequest {
    /// A scan targeting a single record.
    pub fn targeted(record_id: impl Into<String>) -> Self {
        Self {
            id: Some(record_id.into()),
            reschedule_ms: None,
        }
    }
}

pub(crate) async fn run_dispatcher(
    store: Arc<dyn JobStore>,
    registry: Arc<TypeRegistry>,
    tx: mpsc::UnboundedSender<ScanRequest>,
    mut rx: mpsc::UnboundedReceiver<ScanRequest>,
    concurrency: usize,
    idle_time_ms: u64,
    cancel: CancellationToken,
) {
    let sessions = Arc::new(Semaphore::new(concurrency));

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        // Default listener behaviour: any scan without a specific
        // target becomes a rescheduling scan with the idle time.
        let mut request = request;
        if request.id.is_none() && request.reschedule_ms.is_none() {
            request.reschedule_ms = Some(idle_time_ms);
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = sessions.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let store = store.clone();
        let registry = registry.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let types = registry.snapshot();
            let outcome =
                claim::run_worker_session(store.as_ref(), &types, request.id.as_deref()).await;
            // Free the session slot before any re-arm delay.
            drop(permit);

            match outcome {
                Ok(runs) => debug!(runs, targeted = request.id.is_some(), "Scan complete"),
                Err(err) => error!(error = %err, "Scan failed"),
            }

            if let Some(delay) = request.reschedule_ms {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {
                        let _ = tx.send(ScanRequest::default());
                    }
                }
            }
        });
    }
}
