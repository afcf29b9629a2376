//! Producer tasks feeding a bounded result channel.

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use olapgate_core::{ExecutionError, GatewayError, ResultStream};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sending half handed to a producer.
#[derive(Debug)]
pub struct ChunkSender {
    tx: mpsc::Sender<Result<Bytes, GatewayError>>,
    cancel: CancellationToken,
}

impl ChunkSender {
    /// Push one chunk, waiting for channel capacity.
    ///
    /// Returns [`ExecutionError::Cancelled`] once the execution is cancelled
    /// or the consumer is gone; producers should stop on that error.
    pub async fn send(&self, chunk: Bytes) -> Result<(), ExecutionError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            sent = self.tx.send(Ok(chunk)) => sent.map_err(|_| ExecutionError::Cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Run `produce` in a spawned task and expose its chunks as a stream.
///
/// An error returned by the producer becomes the last stream item. A panic
/// is caught and classified with [`GatewayError::from_panic`]. Nothing is
/// sent after cancellation.
pub fn spawn_producer<F, Fut>(
    capacity: usize,
    cancel: CancellationToken,
    produce: F,
) -> ResultStream
where
    F: FnOnce(ChunkSender) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = ChunkSender {
        tx: tx.clone(),
        cancel: cancel.clone(),
    };

    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(async move { produce(sender).await })
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => GatewayError::from_panic(payload),
        };

        if cancel.is_cancelled() {
            debug!(error = %failure, "Producer stopped after cancellation");
            return;
        }
        let _ = tx.send(Err(failure)).await;
    });

    ReceiverStream::new(rx).boxed()
}
