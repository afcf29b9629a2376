//! Execution engine contract.
//!
//! An engine turns query text into an [`Execution`]: a pull-based stream of
//! output chunks, an optional handle for post-run statistics, and a
//! cancellation token the HTTP layer fires when the client goes away.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::GatewayError;

/// Serialized result chunks in the requested output format.
pub type ResultStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// Rows and bytes read by the leaf (source) stages of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafStats {
    pub rows: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("execution statistics are not available until the result stream is drained")]
    NotFinished,
}

/// Introspection into a running or finished query.
pub trait ExecutionHandle: Send + Sync {
    /// Human readable plan tree.
    fn plan_dump(&self) -> String;

    /// Leaf statistics. Only valid once the output has been fully drained.
    fn leaf_rows_bytes(&self) -> Result<LeafStats, StatsError>;
}

/// A started query.
pub struct Execution {
    pub output: ResultStream,
    pub handle: Option<Box<dyn ExecutionHandle>>,
    /// Fired to abort the producer.
    pub cancel: CancellationToken,
}

impl Execution {
    pub fn new(output: ResultStream, cancel: CancellationToken) -> Self {
        Self {
            output,
            handle: None,
            cancel,
        }
    }

    pub fn with_handle(mut self, handle: impl ExecutionHandle + 'static) -> Self {
        self.handle = Some(Box::new(handle));
        self
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("has_handle", &self.handle.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Runs translated queries.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start executing `query`. Output is produced lazily as the stream is polled.
    async fn execute(&self, query: &str, ctx: &ExecutionContext)
        -> Result<Execution, GatewayError>;
}

/// Leaf counters shared between a producer and its handle.
///
/// Producers add to the counters while streaming and call [`finish`] once
/// the output is exhausted; [`snapshot`] refuses to report before that.
///
/// [`finish`]: ExecutionStats::finish
/// [`snapshot`]: ExecutionStats::snapshot
#[derive(Debug, Default)]
pub struct ExecutionStats {
    rows: AtomicU64,
    bytes: AtomicU64,
    finished: AtomicBool,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, rows: u64, bytes: u64) {
        self.rows.fetch_add(rows, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Replace the counters with authoritative totals and mark finished.
    pub fn finish_with(&self, stats: LeafStats) {
        self.rows.store(stats.rows, Ordering::Relaxed);
        self.bytes.store(stats.bytes, Ordering::Relaxed);
        self.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Result<LeafStats, StatsError> {
        if !self.is_finished() {
            return Err(StatsError::NotFinished);
        }
        Ok(LeafStats {
            rows: self.rows.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        })
    }
}
