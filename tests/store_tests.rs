//! SQLite store tests: shared files, candidate query filters, and
//! selector deletes.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use chime::worker::ident::create_worker_id_at;
use chime::{create_worker_id, record_id, Job, JobRecord, JobStore, SqliteStore};

fn job(id: &str, job_type: &str) -> Job {
    Job {
        id: id.to_string(),
        job_type: job_type.to_string(),
        schedule: Some("R/PT1M".to_string()),
        priority: 0,
        concurrency: 1,
        data: Value::Null,
    }
}

fn due_record(id: &str, job_type: &str, now: DateTime<Utc>) -> JobRecord {
    JobRecord::new(job(id, job_type), now - Duration::seconds(1), now)
}

#[test]
fn test_two_handles_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");
    let now = Utc::now();

    let first = SqliteStore::open(&path).unwrap();
    let second = SqliteStore::open(&path).unwrap();

    first.insert(&due_record("shared", "t", now)).unwrap();
    let seen = second.get(&record_id("shared")).unwrap().unwrap();
    assert_eq!(seen.job.id, "shared");

    // A claim through one handle is visible through the other.
    let worker = create_worker_id();
    assert!(second
        .try_claim(&seen, &[worker.clone()], 0, now)
        .unwrap());
    let observed = first.get(&record_id("shared")).unwrap().unwrap();
    assert_eq!(observed.workers, vec![worker]);
    assert_eq!(observed.permits, 0);
}

#[test]
fn test_find_idle_respects_filters() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    let worker = create_worker_id();
    let types = vec!["t".to_string()];

    store.insert(&due_record("eligible", "t", now)).unwrap();
    store.insert(&due_record("other-type", "u", now)).unwrap();

    let mut spent = due_record("no-permits", "t", now);
    spent.permits = 0;
    spent.workers = vec![create_worker_id()];
    store.insert(&spent).unwrap();

    let mut future = due_record("not-due", "t", now);
    future.due = Some(now + Duration::hours(1));
    store.insert(&future).unwrap();

    let found = store.find_idle(now, &types, &worker, None).unwrap().unwrap();
    assert_eq!(found.job.id, "eligible");

    // Remove the one eligible record; nothing else qualifies.
    let eligible = record_id("eligible");
    store.delete(Some(eligible.as_str()), None).unwrap();
    assert!(store.find_idle(now, &types, &worker, None).unwrap().is_none());
}

#[test]
fn test_find_idle_skips_jobs_this_worker_holds() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    let worker = create_worker_id();
    let types = vec!["t".to_string()];

    let mut held = due_record("held", "t", now);
    held.job.concurrency = 2;
    held.permits = 1;
    held.workers = vec![worker.clone()];
    store.insert(&held).unwrap();

    assert!(store.find_idle(now, &types, &worker, None).unwrap().is_none());
    // A different worker still sees the free permit.
    let other = create_worker_id();
    assert!(store.find_idle(now, &types, &other, None).unwrap().is_some());
}

#[test]
fn test_find_expired_uses_per_type_threshold() {
    use chime::encode_expired_threshold;
    use chime::store::ExpiredClause;

    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    let worker = create_worker_id();

    let mut held = due_record("stale-holder", "t", now);
    held.permits = 0;
    held.workers = vec![create_worker_id_at(now - Duration::seconds(30))];
    store.insert(&held).unwrap();

    // A 60s lock has not expired yet.
    let long_lock = vec![ExpiredClause {
        job_type: "t".to_string(),
        threshold: encode_expired_threshold(now - Duration::seconds(60)),
    }];
    assert!(store
        .find_expired(now, &long_lock, &worker, None)
        .unwrap()
        .is_none());

    // A 10s lock has.
    let short_lock = vec![ExpiredClause {
        job_type: "t".to_string(),
        threshold: encode_expired_threshold(now - Duration::seconds(10)),
    }];
    let found = store
        .find_expired(now, &short_lock, &worker, None)
        .unwrap()
        .unwrap();
    assert_eq!(found.job.id, "stale-holder");
}

#[test]
fn test_reschedule_guard_rejects_older_due() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    store.insert(&due_record("guarded", "t", now)).unwrap();
    let id = record_id("guarded");

    // A newer claim moves due forward...
    assert!(store
        .reschedule(&id, "t", Some("R/PT1M"), now + Duration::seconds(120), now)
        .unwrap());
    // ...and an older claim's reschedule bounces off the guard.
    assert!(!store
        .reschedule(&id, "t", Some("R/PT1M"), now + Duration::seconds(60), now)
        .unwrap());

    let record = store.get(&id).unwrap().unwrap();
    assert_eq!(
        record.due.unwrap().timestamp_millis(),
        (now + Duration::seconds(120)).timestamp_millis()
    );
}

#[test]
fn test_delete_selector_must_fully_match() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = Utc::now();
    store.insert(&due_record("keyed", "x", now)).unwrap();
    let keyed = record_id("keyed");

    assert_eq!(store.delete(Some(keyed.as_str()), Some("y")).unwrap(), 0);
    assert_eq!(store.delete(Some(keyed.as_str()), Some("x")).unwrap(), 1);
}

#[test]
fn test_list_orders_by_creation() {
    let store = SqliteStore::open_in_memory().unwrap();
    let base = Utc::now();

    for (offset, id) in [(2, "third"), (0, "first"), (1, "second")] {
        let at = base + Duration::seconds(offset);
        store.insert(&JobRecord::new(job(id, "t"), at, at)).unwrap();
    }

    let ids: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|record| record.job.id)
        .collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}
