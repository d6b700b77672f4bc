//! The claim engine.
//!
//! One invocation runs a worker session: a fresh worker id and one
//! captured `now`, reused across every retry and every claim in the
//! session. The session loops candidate selection → conditional claim →
//! handler → reschedule → release until a scan finds nothing claimable.
//! Across sessions and processes, the conditional claim update is the
//! only coordination primitive.

use chrono::{Duration, Utc};
use tracing::{debug, error};

use crate::error::{ChimeError, Result};
use crate::scheduler::job::JobContext;
use crate::scheduler::registry::TypeSnapshot;
use crate::scheduler::schedule;
use crate::store::{ExpiredClause, JobStore};
use crate::worker::ident::{create_worker_id, encode_expired_threshold};

/// Run one worker session against `store`, executing jobs of the given
/// registered types. Returns the number of runs performed.
///
/// With a target `record_id`, only that record is considered, and the
/// session fails with `NotFound` when it never claims it.
pub(crate) async fn run_worker_session(
    store: &dyn JobStore,
    types: &[TypeSnapshot],
    record_id: Option<&str>,
) -> Result<usize> {
    let worker_id = create_worker_id();
    let now = Utc::now();

    let type_names: Vec<String> = types.iter().map(|entry| entry.name.clone()).collect();
    let expired_clauses: Vec<ExpiredClause> = types
        .iter()
        .map(|entry| ExpiredClause {
            job_type: entry.name.clone(),
            threshold: encode_expired_threshold(
                now - Duration::milliseconds(entry.lock_duration_ms as i64),
            ),
        })
        .collect();

    let mut runs = 0usize;
    loop {
        // Candidate selection: an idle candidate with a free permit,
        // else a job with at least one expired lease to steal.
        let candidate = match store.find_idle(now, &type_names, &worker_id, record_id)? {
            Some(record) => Some(record),
            None => store.find_expired(now, &expired_clauses, &worker_id, record_id)?,
        };
        let Some(record) = candidate else {
            if runs == 0 {
                if let Some(id) = record_id {
                    return Err(ChimeError::NotFound(id.to_string()));
                }
            }
            return Ok(runs);
        };

        let Some(entry) = types.iter().find(|t| t.name == record.job.job_type) else {
            // The candidate queries only match registered types.
            return Ok(runs);
        };

        // Claim: prune leases past the type's expiry threshold, append
        // ourselves, and restore the reclaimed permits minus one for us.
        let threshold = encode_expired_threshold(
            now - Duration::milliseconds(entry.lock_duration_ms as i64),
        );
        let mut workers: Vec<String> = record
            .workers
            .iter()
            .filter(|worker| worker.as_str() > threshold.as_str())
            .cloned()
            .collect();
        workers.push(worker_id.clone());
        let permits = if record.permits < 0 {
            record.permits
        } else {
            record.permits + record.workers.len() as i64 - workers.len() as i64
        };

        if !store.try_claim(&record, &workers, permits, now)? {
            debug!(job_id = %record.job.id, "Lost claim race, rescanning");
            continue;
        }
        runs += 1;
        debug!(
            job_id = %record.job.id,
            job_type = %record.job.job_type,
            worker_id = %worker_id,
            "Permit claimed"
        );

        // Handler failures are logged, never abort rescheduling.
        let context = JobContext {
            job: record.job.clone(),
            due: record.due,
            worker_id: worker_id.clone(),
        };
        if let Err(err) = entry.handler.run(context).await {
            error!(
                job_id = %record.job.id,
                job_type = %record.job.job_type,
                error = %err,
                "Job handler failed"
            );
        }

        // Reschedule or remove.
        let next = schedule::next_after_run(record.job.schedule.as_deref(), now)?;
        match next.due {
            None => {
                store.remove_exhausted(&record.id, &record.job.job_type)?;
                debug!(job_id = %record.job.id, "Schedule exhausted, record removed");
            }
            Some(due) => {
                // The store's due <= new-due guard keeps us from
                // overwriting a more recent claim's reschedule.
                let rewritten = next.schedule.or_else(|| record.job.schedule.clone());
                store.reschedule(
                    &record.id,
                    &record.job.job_type,
                    rewritten.as_deref(),
                    due,
                    now,
                )?;

                // Return the permit. A no-op when our lease was
                // considered expired and already pruned by someone else.
                store.release(&record.id, &record.job.job_type, &worker_id, now)?;
            }
        }
    }
}
