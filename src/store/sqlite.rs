//! SQLite-backed job store.
//!
//! One row per job record. The `workers` column holds the compact JSON
//! array text of worker ids, so the conditional claim predicate can
//! compare the full prior value — including element order — as plain
//! text, and the membership/expiry predicates run through `json_each`.
//! Instants are integer epoch-milliseconds.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ToSql};

use crate::error::{ChimeError, Result};
use crate::scheduler::{Job, JobRecord, Meta};
use crate::store::{ExpiredClause, JobStore};

const COLUMNS: &str = "id, ext_id, type, schedule, priority, concurrency, data, \
                       due, permits, workers, completed, created, updated";

/// Shared handle to one SQLite job collection.
///
/// Clones share the connection; every worker session and every
/// scheduler instance pointed at the same handle (or the same file)
/// contends through the conditional updates alone.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the job collection at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory collection.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn query_one(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(into_record(read_row(row)?)?)),
            None => Ok(None),
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          TEXT    NOT NULL PRIMARY KEY,
            ext_id      TEXT    NOT NULL,
            type        TEXT    NOT NULL,
            schedule    TEXT,
            priority    INTEGER NOT NULL,
            concurrency INTEGER NOT NULL,
            data        TEXT    NOT NULL,   -- opaque JSON payload
            due         INTEGER,            -- epoch ms or NULL
            permits     INTEGER NOT NULL,
            workers     TEXT    NOT NULL,   -- JSON array of worker ids
            completed   INTEGER,            -- epoch ms or NULL
            created     INTEGER NOT NULL,
            updated     INTEGER NOT NULL,
            UNIQUE (type, ext_id)
        ) STRICT;

        -- Serves the candidate queries: WHERE due <= ? ... ORDER BY priority, id
        CREATE INDEX IF NOT EXISTS idx_jobs_scan
            ON jobs (due, priority, type, permits);
        ",
    )?;
    Ok(())
}

struct RawRow {
    id: String,
    ext_id: String,
    job_type: String,
    schedule: Option<String>,
    priority: i64,
    concurrency: i64,
    data: String,
    due: Option<i64>,
    permits: i64,
    workers: String,
    completed: Option<i64>,
    created: i64,
    updated: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        ext_id: row.get(1)?,
        job_type: row.get(2)?,
        schedule: row.get(3)?,
        priority: row.get(4)?,
        concurrency: row.get(5)?,
        data: row.get(6)?,
        due: row.get(7)?,
        permits: row.get(8)?,
        workers: row.get(9)?,
        completed: row.get(10)?,
        created: row.get(11)?,
        updated: row.get(12)?,
    })
}

fn into_record(raw: RawRow) -> Result<JobRecord> {
    Ok(JobRecord {
        id: raw.id,
        job: Job {
            id: raw.ext_id,
            job_type: raw.job_type,
            schedule: raw.schedule,
            priority: raw.priority,
            concurrency: raw.concurrency,
            data: serde_json::from_str(&raw.data)?,
        },
        due: raw.due.map(ms_to_instant),
        permits: raw.permits,
        workers: serde_json::from_str(&raw.workers)?,
        completed: raw.completed.map(ms_to_instant),
        meta: Meta {
            created: ms_to_instant(raw.created),
            updated: ms_to_instant(raw.updated),
        },
    })
}

fn ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn ms_to_instant(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

impl JobStore for SqliteStore {
    fn insert(&self, record: &JobRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO jobs
             (id, ext_id, type, schedule, priority, concurrency, data,
              due, permits, workers, completed, created, updated)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                record.id,
                record.job.id,
                record.job.job_type,
                record.job.schedule,
                record.job.priority,
                record.job.concurrency,
                serde_json::to_string(&record.job.data)?,
                record.due.map(ms),
                record.permits,
                serde_json::to_string(&record.workers)?,
                record.completed.map(ms),
                ms(record.meta.created),
                ms(record.meta.updated),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ChimeError::DuplicateKey(format!(
                    "job {} of type {}",
                    record.job.id, record.job.job_type
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get(&self, record_id: &str) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        self.query_one(&sql, &[&record_id])
    }

    fn delete(&self, record_id: Option<&str>, job_type: Option<&str>) -> Result<usize> {
        let mut clauses = Vec::new();
        let mut bound: Vec<&dyn ToSql> = Vec::new();
        if let Some(ref id) = record_id {
            clauses.push("id = ?");
            bound.push(id);
        }
        if let Some(ref job_type) = job_type {
            clauses.push("type = ?");
            bound.push(job_type);
        }
        if clauses.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM jobs WHERE {}", clauses.join(" AND "));
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(&sql, &bound[..])?)
    }

    fn list(&self) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {COLUMNS} FROM jobs ORDER BY created ASC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let raw: Vec<RawRow> = stmt
            .query_map([], read_row)?
            .collect::<rusqlite::Result<_>>()?;
        raw.into_iter().map(into_record).collect()
    }

    fn find_idle(
        &self,
        now: DateTime<Utc>,
        job_types: &[String],
        worker_id: &str,
        record_id: Option<&str>,
    ) -> Result<Option<JobRecord>> {
        if job_types.is_empty() {
            return Ok(None);
        }
        let now_ms = ms(now);
        let worker = worker_id.to_string();
        let mut sql = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE due IS NOT NULL AND due <= ? AND permits != 0 \
             AND NOT EXISTS (SELECT 1 FROM json_each(jobs.workers) WHERE json_each.value = ?) \
             AND type IN ({})",
            placeholders(job_types.len())
        );
        let mut bound: Vec<&dyn ToSql> = vec![&now_ms, &worker];
        for job_type in job_types {
            bound.push(job_type);
        }
        if let Some(ref id) = record_id {
            sql.push_str(" AND id = ?");
            bound.push(id);
        }
        sql.push_str(" ORDER BY priority ASC, id ASC LIMIT 1");
        self.query_one(&sql, &bound)
    }

    fn find_expired(
        &self,
        now: DateTime<Utc>,
        clauses: &[ExpiredClause],
        worker_id: &str,
        record_id: Option<&str>,
    ) -> Result<Option<JobRecord>> {
        if clauses.is_empty() {
            return Ok(None);
        }
        let now_ms = ms(now);
        let worker = worker_id.to_string();
        let arms = vec![
            "(type = ? AND EXISTS \
             (SELECT 1 FROM json_each(jobs.workers) WHERE json_each.value <= ?))";
            clauses.len()
        ]
        .join(" OR ");
        let mut sql = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE due IS NOT NULL AND due <= ? \
             AND NOT EXISTS (SELECT 1 FROM json_each(jobs.workers) WHERE json_each.value = ?) \
             AND ({arms})"
        );
        let mut bound: Vec<&dyn ToSql> = vec![&now_ms, &worker];
        for clause in clauses {
            bound.push(&clause.job_type);
            bound.push(&clause.threshold);
        }
        if let Some(ref id) = record_id {
            sql.push_str(" AND id = ?");
            bound.push(id);
        }
        sql.push_str(" ORDER BY priority ASC, id ASC LIMIT 1");
        self.query_one(&sql, &bound)
    }

    fn try_claim(
        &self,
        previous: &JobRecord,
        workers: &[String],
        permits: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let workers_new = serde_json::to_string(workers)?;
        let workers_prev = serde_json::to_string(&previous.workers)?;
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET permits = ?1, workers = ?2, updated = ?3 \
             WHERE id = ?4 AND permits = ?5 AND workers = ?6",
            params![
                permits,
                workers_new,
                ms(now),
                previous.id,
                previous.permits,
                workers_prev
            ],
        )?;
        Ok(changed == 1)
    }

    fn reschedule(
        &self,
        record_id: &str,
        job_type: &str,
        schedule: Option<&str>,
        new_due: DateTime<Utc>,
        completed: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET schedule = ?1, due = ?2, completed = ?3, updated = ?3 \
             WHERE id = ?4 AND type = ?5 AND due IS NOT NULL AND due <= ?2",
            params![schedule, ms(new_due), ms(completed), record_id, job_type],
        )?;
        Ok(changed == 1)
    }

    fn remove_exhausted(&self, record_id: &str, job_type: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM jobs WHERE id = ?1 AND type = ?2",
            params![record_id, job_type],
        )?;
        Ok(removed == 1)
    }

    fn release(
        &self,
        record_id: &str,
        job_type: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET \
             workers = COALESCE((SELECT json_group_array(json_each.value) \
                                 FROM json_each(jobs.workers) \
                                 WHERE json_each.value <> ?1), '[]'), \
             permits = CASE WHEN permits < 0 THEN permits ELSE permits + 1 END, \
             updated = ?2 \
             WHERE id = ?3 AND type = ?4 \
             AND EXISTS (SELECT 1 FROM json_each(jobs.workers) WHERE json_each.value = ?1)",
            params![worker_id, ms(now), record_id, job_type],
        )?;
        Ok(())
    }
}
