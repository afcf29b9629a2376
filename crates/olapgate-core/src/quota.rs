//! Interval based resource quotas.
//!
//! A quota is a named set of intervals (for example one hour and one day),
//! each with its own limits. Counters live in a [`QuotaRegistry`] shared by
//! every request; a request holds an `Arc` to the [`QuotaForIntervals`] of its
//! identity, so usage recorded by one request is visible to all of them.
//!
//! Windows are aligned to the Unix epoch: an hourly interval always covers
//! `[hh:00:00, hh+1:00:00)`. Counters reset when a new window starts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::error::AuthorizationError;

/// Limits for one interval. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaLimits {
    pub queries: u64,
    pub errors: u64,
    pub result_rows: u64,
    pub read_rows: u64,
    pub execution_time: Duration,
}

/// One interval of a quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaInterval {
    pub duration: Duration,
    pub limits: QuotaLimits,
}

/// A named quota definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSpec {
    pub name: String,
    /// Track usage per client supplied `quota_key` instead of per user.
    pub keyed: bool,
    pub intervals: Vec<QuotaInterval>,
}

/// Accumulated usage inside one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaUsage {
    pub queries: u64,
    pub errors: u64,
    pub result_rows: u64,
    pub result_bytes: u64,
    pub read_rows: u64,
    pub read_bytes: u64,
    pub execution_time: Duration,
}

/// A limit was reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Quota for user '{key}' for {interval_secs} seconds has been exceeded: {resource} = {used}/{max}. Interval will end at {ends_at}"
)]
pub struct QuotaExceeded {
    pub key: String,
    pub interval_secs: u64,
    pub resource: &'static str,
    pub used: u64,
    pub max: u64,
    pub ends_at: String,
}

#[derive(Debug)]
struct IntervalCounters {
    window_start: u64,
    usage: QuotaUsage,
}

/// Counters for a single interval.
#[derive(Debug)]
pub struct QuotaForInterval {
    interval: QuotaInterval,
    counters: Mutex<IntervalCounters>,
}

impl QuotaForInterval {
    fn new(interval: QuotaInterval) -> Self {
        Self {
            interval,
            counters: Mutex::new(IntervalCounters {
                window_start: 0,
                usage: QuotaUsage::default(),
            }),
        }
    }

    fn duration_secs(&self) -> u64 {
        self.interval.duration.as_secs().max(1)
    }

    fn window_start(&self, now: SystemTime) -> u64 {
        let secs = unix_secs(now);
        secs - secs % self.duration_secs()
    }

    /// Lock the counters, rolling over to a fresh window if `now` left the old one.
    fn counters_at(&self, now: SystemTime) -> MutexGuard<'_, IntervalCounters> {
        let start = self.window_start(now);
        let mut counters = self.counters.lock();
        if counters.window_start != start {
            counters.window_start = start;
            counters.usage = QuotaUsage::default();
        }
        counters
    }

    fn record(&self, now: SystemTime, update: impl FnOnce(&mut QuotaUsage)) {
        update(&mut self.counters_at(now).usage);
    }

    fn usage(&self, now: SystemTime) -> QuotaUsage {
        self.counters_at(now).usage
    }

    fn check(&self, key: &str, now: SystemTime) -> Result<(), QuotaExceeded> {
        let counters = self.counters_at(now);
        let usage = counters.usage;
        let limits = self.interval.limits;
        let checks = [
            ("queries", usage.queries, limits.queries),
            ("errors", usage.errors, limits.errors),
            ("result rows", usage.result_rows, limits.result_rows),
            ("read rows", usage.read_rows, limits.read_rows),
            (
                "execution time (ms)",
                usage.execution_time.as_millis() as u64,
                limits.execution_time.as_millis() as u64,
            ),
        ];

        for (resource, used, max) in checks {
            if max != 0 && used > max {
                return Err(QuotaExceeded {
                    key: key.to_string(),
                    interval_secs: self.duration_secs(),
                    resource,
                    used,
                    max,
                    ends_at: format_timestamp(counters.window_start + self.duration_secs()),
                });
            }
        }
        Ok(())
    }

    fn render(&self, now: SystemTime, out: &mut String) {
        let counters = self.counters_at(now);
        let usage = counters.usage;
        let start = counters.window_start;
        let _ = write!(
            out,
            "Interval: {} - {}.\n\
             Queries: {}.\n\
             Errors: {}.\n\
             Result rows: {}.\n\
             Result bytes: {}.\n\
             Read rows: {}.\n\
             Read bytes: {}.\n\
             Execution time: {:.3} sec.\n",
            format_timestamp(start),
            format_timestamp(start + self.duration_secs()),
            usage.queries,
            usage.errors,
            usage.result_rows,
            usage.result_bytes,
            usage.read_rows,
            usage.read_bytes,
            usage.execution_time.as_secs_f64(),
        );
    }
}

/// Usage counters of one identity across all intervals of its quota.
#[derive(Debug)]
pub struct QuotaForIntervals {
    name: String,
    key: String,
    intervals: Vec<QuotaForInterval>,
}

impl QuotaForIntervals {
    /// A quota with no intervals: never limits, renders nothing.
    pub fn unlimited() -> Self {
        Self {
            name: String::new(),
            key: String::new(),
            intervals: Vec::new(),
        }
    }

    pub fn new(spec: &QuotaSpec, key: impl Into<String>) -> Self {
        Self {
            name: spec.name.clone(),
            key: key.into(),
            intervals: spec
                .intervals
                .iter()
                .cloned()
                .map(QuotaForInterval::new)
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Count a new query and fail if any interval is now over its limits.
    pub fn start_query(&self, now: SystemTime) -> Result<(), QuotaExceeded> {
        for interval in &self.intervals {
            interval.record(now, |usage| usage.queries += 1);
        }
        self.check_exceeded(now)
    }

    pub fn check_exceeded(&self, now: SystemTime) -> Result<(), QuotaExceeded> {
        self.intervals
            .iter()
            .try_for_each(|interval| interval.check(&self.key, now))
    }

    pub fn add_error(&self, now: SystemTime) {
        for interval in &self.intervals {
            interval.record(now, |usage| usage.errors += 1);
        }
    }

    pub fn add_result(&self, now: SystemTime, rows: u64, bytes: u64) {
        for interval in &self.intervals {
            interval.record(now, |usage| {
                usage.result_rows += rows;
                usage.result_bytes += bytes;
            });
        }
    }

    pub fn add_read(&self, now: SystemTime, rows: u64, bytes: u64) {
        for interval in &self.intervals {
            interval.record(now, |usage| {
                usage.read_rows += rows;
                usage.read_bytes += bytes;
            });
        }
    }

    pub fn add_execution_time(&self, now: SystemTime, elapsed: Duration) {
        for interval in &self.intervals {
            interval.record(now, |usage| usage.execution_time += elapsed);
        }
    }

    /// Usage of every interval, in definition order.
    pub fn usage(&self, now: SystemTime) -> Vec<QuotaUsage> {
        self.intervals.iter().map(|i| i.usage(now)).collect()
    }

    /// Human readable report of every interval.
    pub fn render(&self, now: SystemTime) -> String {
        let mut out = String::new();
        for interval in &self.intervals {
            interval.render(now, &mut out);
        }
        out
    }
}

/// All quota definitions plus the live counters per (quota, key).
#[derive(Debug, Default)]
pub struct QuotaRegistry {
    specs: HashMap<String, QuotaSpec>,
    counters: DashMap<(String, String), Arc<QuotaForIntervals>>,
}

impl QuotaRegistry {
    pub fn new(specs: impl IntoIterator<Item = QuotaSpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
            counters: DashMap::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Counters for `user` under quota `name`.
    ///
    /// Keyed quotas track the client supplied `quota_key` (falling back to the
    /// user name when it is empty); other quotas reject a non-empty key.
    pub fn quota_for(
        &self,
        name: &str,
        user: &str,
        quota_key: &str,
    ) -> Result<Arc<QuotaForIntervals>, AuthorizationError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| AuthorizationError::UnknownQuota(name.to_string()))?;

        if !spec.keyed && !quota_key.is_empty() {
            return Err(AuthorizationError::QuotaKeysNotAllowed(name.to_string()));
        }

        let key = if spec.keyed && !quota_key.is_empty() {
            quota_key
        } else {
            user
        };

        let entry = self
            .counters
            .entry((name.to_string(), key.to_string()))
            .or_insert_with(|| Arc::new(QuotaForIntervals::new(spec, key)));
        Ok(Arc::clone(entry.value()))
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format_timestamp(secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}
