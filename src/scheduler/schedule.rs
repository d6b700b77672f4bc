//! Schedule calculator.
//!
//! Schedule strings follow ISO 8601 and come in three shapes:
//!
//! | Shape                  | Behaviour                                        |
//! |------------------------|--------------------------------------------------|
//! | `INSTANT`              | One-shot at an absolute instant, then removed    |
//! | `R[n]/DURATION`        | Repeat `n` times (forever if omitted), from now  |
//! | `R[n]/START/DURATION`  | Repeat with an interval beginning at `START`     |
//!
//! After each run the repeating shapes are rewritten with the start
//! reset to "now": a job that was dormant for many periods resumes on
//! its next period instead of replaying every missed occurrence.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::error::{ChimeError, Result};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// A parsed schedule string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// A single absolute instant.
    Instant(DateTime<Utc>),
    /// A repeating interval.
    Repeat {
        /// Remaining run count; `None` repeats forever.
        count: Option<u64>,
        /// Start of the current interval; `None` means "now".
        start: Option<DateTime<Utc>>,
        period: Duration,
        /// The original duration text, carried through rewrites verbatim.
        period_text: String,
    },
}

/// The rescheduling decision after a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextRun {
    /// Next due instant; `None` means "do not reschedule, remove".
    pub due: Option<DateTime<Utc>>,
    /// Rewritten schedule string, when the schedule changed.
    pub schedule: Option<String>,
}

/// Parse a schedule string into its [`Schedule`] shape.
pub fn parse(text: &str) -> Result<Schedule> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChimeError::InvalidSchedule("empty schedule".to_string()));
    }

    if !text.starts_with('R') {
        return Ok(Schedule::Instant(parse_instant(text)?));
    }

    let mut parts = text.split('/');
    let head = parts.next().unwrap_or_default();
    let count = if head.len() == 1 {
        None
    } else {
        Some(head[1..].parse::<u64>().map_err(|_| {
            ChimeError::InvalidSchedule(format!("bad repeat count in {text:?}"))
        })?)
    };

    let rest: Vec<&str> = parts.collect();
    match rest.as_slice() {
        [duration] => Ok(Schedule::Repeat {
            count,
            start: None,
            period: parse_duration(duration)?,
            period_text: duration.to_string(),
        }),
        [start, duration] => Ok(Schedule::Repeat {
            count,
            start: Some(parse_instant(start)?),
            period: parse_duration(duration)?,
            period_text: duration.to_string(),
        }),
        _ => Err(ChimeError::InvalidSchedule(format!(
            "expected R[n]/DURATION or R[n]/START/DURATION, got {text:?}"
        ))),
    }
}

/// First due instant for a job on insert.
///
/// Returns the start of the first interval: `START` for the anchored
/// repeat shape, `now` for the unanchored one, the instant itself for a
/// one-shot. A job with no schedule runs once, now.
pub fn first_due(schedule: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match schedule {
        None => Ok(now),
        Some(text) => match parse(text)? {
            Schedule::Instant(at) => Ok(at),
            Schedule::Repeat { start, .. } => Ok(start.unwrap_or(now)),
        },
    }
}

/// Next due instant after a run completed at `now`, plus the schedule
/// rewrite that goes with it.
///
/// `due: None` tells the caller to remove the record. When the last
/// remaining repetition just ran, the schedule collapses to the instant
/// that fired; the record is removed before that ever persists, but a
/// crash in between leaves a one-shot already in the past, which the
/// next scan runs once and removes.
pub fn next_after_run(schedule: Option<&str>, now: DateTime<Utc>) -> Result<NextRun> {
    let Some(text) = schedule else {
        return Ok(NextRun {
            due: None,
            schedule: None,
        });
    };

    match parse(text)? {
        Schedule::Instant(_) => Ok(NextRun {
            due: None,
            schedule: None,
        }),
        Schedule::Repeat {
            count: Some(n),
            start,
            ..
        } if n <= 1 => Ok(NextRun {
            due: None,
            schedule: Some(format_instant(start.unwrap_or(now))),
        }),
        Schedule::Repeat {
            count,
            period,
            period_text,
            ..
        } => {
            // The interval start is reset to now rather than advanced by
            // one period, so a dormant job never replays missed runs.
            let end = now + period;
            let head = match count {
                Some(n) => format!("R{}", n - 1),
                None => "R".to_string(),
            };
            Ok(NextRun {
                due: Some(end),
                schedule: Some(format!("{head}/{}/{period_text}", format_instant(end))),
            })
        }
    }
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| ChimeError::InvalidSchedule(format!("bad instant {text:?}: {err}")))
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO 8601 duration (`PnW`, `PnYnMnDTnHnMnS`, fractional
/// seconds allowed) into a [`Duration`].
///
/// Years and months are fixed at 365 and 30 days; calendar arithmetic
/// is out of scope for interval schedules.
fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || ChimeError::InvalidSchedule(format!("bad duration {text:?}"));

    let body = text.strip_prefix('P').ok_or_else(invalid)?;
    let mut millis: f64 = 0.0;
    let mut in_time = false;
    let mut number = String::new();
    let mut saw_component = false;

    for c in body.chars() {
        match c {
            'T' if number.is_empty() => in_time = true,
            d if d.is_ascii_digit() || d == '.' => number.push(d),
            unit => {
                let value: f64 = number.parse().map_err(|_| invalid())?;
                number.clear();
                saw_component = true;
                let unit_millis = match (unit, in_time) {
                    ('Y', false) => 365 * MILLIS_PER_DAY,
                    ('M', false) => 30 * MILLIS_PER_DAY,
                    ('W', false) => 7 * MILLIS_PER_DAY,
                    ('D', false) => MILLIS_PER_DAY,
                    ('H', true) => 3_600_000,
                    ('M', true) => 60_000,
                    ('S', true) => 1_000,
                    _ => return Err(invalid()),
                };
                millis += value * unit_millis as f64;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return Err(invalid());
    }
    let millis = millis.round() as i64;
    if millis <= 0 {
        return Err(ChimeError::InvalidSchedule(format!(
            "non-positive duration {text:?}"
        )));
    }
    Ok(Duration::milliseconds(millis))
}
