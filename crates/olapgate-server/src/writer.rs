//! Streaming response body.
//!
//! [`ResponseWriter`] forwards result chunks from the engine to hyper. It
//! owns the request's end-of-life work: on end of data it marks the response
//! complete and logs statistics, on a mid-stream failure it logs the error
//! and yields it so the connection is aborted, and when dropped early (the
//! client went away) it cancels the execution.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use olapgate_core::{
    ExecutionError, ExecutionHandle, GatewayError, QuotaForIntervals, ResultStream,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::DropGuard;
use tracing::{info, trace};

use crate::error_map::ErrorMapper;
use crate::instrument::{self, Stopwatch};
use crate::progress::ResponseProgress;
use crate::quota_report;

/// End-of-request logging, run exactly once.
#[derive(Debug)]
pub struct Completion {
    quota: Arc<QuotaForIntervals>,
    stopwatch: Stopwatch,
}

impl Completion {
    pub fn new(quota: Arc<QuotaForIntervals>, stopwatch: Stopwatch) -> Self {
        Self { quota, stopwatch }
    }

    /// The whole result was delivered.
    pub fn finish(self, handle: Option<&dyn ExecutionHandle>) {
        instrument::record(handle, self.stopwatch.elapsed());
        quota_report::report(&self.quota);
        info!("Done processing query");
    }

    /// The request ended without delivering the whole result.
    pub fn abort(self) {
        quota_report::report(&self.quota);
    }
}

/// Stream of body chunks with deadline and cancellation handling.
pub struct ResponseWriter {
    first: Option<Bytes>,
    output: ResultStream,
    handle: Option<Box<dyn ExecutionHandle>>,
    progress: ResponseProgress,
    mapper: ErrorMapper,
    /// `None` once the request has finished one way or another.
    completion: Option<Completion>,
    deadline: Pin<Box<Sleep>>,
    limit: Duration,
    /// Cancels the execution when dropped while armed.
    cancel_guard: Option<DropGuard>,
    bytes_sent: u64,
}

/// Pieces of a started execution handed to the writer.
pub struct WriterParts {
    pub output: ResultStream,
    pub handle: Option<Box<dyn ExecutionHandle>>,
    pub cancel_guard: DropGuard,
    pub completion: Completion,
    pub deadline: Instant,
    pub limit: Duration,
}

impl ResponseWriter {
    /// Start streaming with an already received first chunk.
    pub fn new(
        first: Bytes,
        parts: WriterParts,
        progress: ResponseProgress,
        mapper: ErrorMapper,
    ) -> Self {
        progress.begin_streaming();
        Self {
            first: Some(first),
            output: parts.output,
            handle: parts.handle,
            progress,
            mapper,
            completion: Some(parts.completion),
            deadline: Box::pin(tokio::time::sleep_until(parts.deadline)),
            limit: parts.limit,
            cancel_guard: Some(parts.cancel_guard),
            bytes_sent: 0,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn send(&mut self, chunk: Bytes) -> Poll<Option<Result<Bytes, GatewayError>>> {
        self.bytes_sent += chunk.len() as u64;
        Poll::Ready(Some(Ok(chunk)))
    }

    fn finish(&mut self) {
        if let Some(guard) = self.cancel_guard.take() {
            guard.disarm();
        }
        self.progress.complete();
        if let Some(completion) = self.completion.take() {
            completion.finish(self.handle.as_deref());
        }
    }

    fn fail(&mut self, err: GatewayError) -> Poll<Option<Result<Bytes, GatewayError>>> {
        // Dropping the armed guard stops the producer.
        self.cancel_guard.take();
        let _ = self.mapper.fail(&self.progress, &err);
        if let Some(completion) = self.completion.take() {
            completion.abort();
        }
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for ResponseWriter {
    type Item = Result<Bytes, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.completion.is_none() {
            return Poll::Ready(None);
        }
        if let Some(first) = this.first.take() {
            return this.send(first);
        }
        if this.deadline.as_mut().poll(cx).is_ready() {
            let err = ExecutionError::Timeout { limit: this.limit };
            return this.fail(err.into());
        }

        loop {
            match this.output.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) if chunk.is_empty() => continue,
                Poll::Ready(Some(Ok(chunk))) => return this.send(chunk),
                Poll::Ready(Some(Err(err))) => return this.fail(err),
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            trace!(
                "Client disconnected after {} bytes, cancelling query",
                self.bytes_sent
            );
            // cancel_guard is still armed and fires when dropped with self
            completion.abort();
        }
    }
}
