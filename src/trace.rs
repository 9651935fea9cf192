//! Request trace replay.
//!
//! A trace is a text stream with one request per line:
//!
//! ```text
//! # client_id  unix_seconds
//! alice 1700000000
//! bob   1700000004
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::{BufRead, Write};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::HousekeepingConfig;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Decision, FailMode, LimiterStore, RateLimiter};

/// One request in a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub client_id: String,
    pub at: DateTime<Utc>,
}

/// How replay results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// `<client> <ts> admit|reject remaining=<n> retry_after=<secs>`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Settings for a replay run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions<'a> {
    pub format: OutputFormat,
    /// Run eviction passes on trace time
    pub housekeeping: Option<&'a HousekeepingConfig>,
    /// Decision to take when the record store is unreachable
    pub on_unavailable: FailMode,
}

/// Totals for a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub admitted: usize,
    pub rejected: usize,
    pub evicted: usize,
}

#[derive(Serialize)]
struct ReplayLine<'a> {
    client_id: &'a str,
    timestamp: i64,
    #[serde(flatten)]
    decision: Decision,
}

/// Parse one trace line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<TraceEntry>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let trace_err = |message: String| TurnstileError::Trace {
        line: line_no,
        message,
    };

    let mut fields = line.split_whitespace();
    let (Some(client_id), Some(ts), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(trace_err("expected `<client_id> <unix_seconds>`".to_string()));
    };

    let secs: i64 = ts
        .parse()
        .map_err(|e| trace_err(format!("invalid timestamp `{}`: {}", ts, e)))?;
    let at = Utc
        .timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| trace_err(format!("timestamp `{}` out of range", secs)))?;

    Ok(Some(TraceEntry {
        client_id: client_id.to_string(),
        at,
    }))
}

/// Read every entry of a trace.
pub fn read_trace<R: BufRead>(reader: R) -> Result<Vec<TraceEntry>> {
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        if let Some(entry) = parse_line(idx + 1, &line?)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Run every entry through `limiter` and write one result line per entry.
///
/// With `options.housekeeping` set, an eviction pass runs whenever trace time
/// has moved `interval_secs` past the previous pass.
pub fn replay<S, C, W>(
    limiter: &RateLimiter<S, C>,
    entries: &[TraceEntry],
    out: &mut W,
    options: ReplayOptions<'_>,
) -> Result<ReplaySummary>
where
    S: LimiterStore,
    C: Clock,
    W: Write,
{
    let mut summary = ReplaySummary::default();
    let mut last_pass: Option<DateTime<Utc>> = None;
    let window = limiter.policy().duration();

    for entry in entries {
        if let Some(hk) = options.housekeeping {
            let prev = *last_pass.get_or_insert(entry.at);
            if (entry.at - prev).to_std().unwrap_or_default() >= hk.interval() {
                match limiter.store().evict_idle(entry.at, hk.idle_for(), window) {
                    Ok(evicted) => summary.evicted += evicted,
                    Err(e) => warn!(error = %e, "Eviction pass failed"),
                }
                last_pass = Some(entry.at);
            }
        }

        let decision = limiter.check_or_at(&entry.client_id, entry.at, options.on_unavailable)?;
        if decision.admitted {
            summary.admitted += 1;
        } else {
            summary.rejected += 1;
        }

        match options.format {
            OutputFormat::Text => writeln!(
                out,
                "{} {} {} remaining={} retry_after={}",
                entry.client_id,
                entry.at.timestamp(),
                if decision.admitted { "admit" } else { "reject" },
                decision.remaining,
                decision.retry_after.as_secs_f64(),
            )?,
            OutputFormat::Json => {
                let line = ReplayLine {
                    client_id: &entry.client_id,
                    timestamp: entry.at.timestamp(),
                    decision,
                };
                serde_json::to_writer(&mut *out, &line)
                    .map_err(|e| TurnstileError::Io(e.into()))?;
                writeln!(out)?;
            }
        }
    }

    debug!(
        admitted = summary.admitted,
        rejected = summary.rejected,
        evicted = summary.evicted,
        "Trace replay complete"
    );
    Ok(summary)
}
