//! Per-request response state.
//!
//! ```text
//! NotStarted --first chunk--> Streaming --end of data--> Completed
//!      |                          |
//!      +--------- error ----------+--> Failed
//! ```
//!
//! Once the state has left `NotStarted` the status line and headers are on
//! the wire, so a failure can no longer produce an error response.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseState {
    NotStarted = 0,
    Streaming = 1,
    Completed = 2,
    Failed = 3,
}

impl ResponseState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Streaming,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Whether response headers have been committed.
    pub fn headers_sent(self) -> bool {
        self != Self::NotStarted
    }
}

/// Shared handle on the state of one response.
#[derive(Debug, Clone)]
pub struct ResponseProgress {
    state: Arc<AtomicU8>,
}

impl ResponseProgress {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ResponseState::NotStarted as u8)),
        }
    }

    pub fn state(&self) -> ResponseState {
        ResponseState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `NotStarted -> Streaming`. Returns false from any other state.
    pub fn begin_streaming(&self) -> bool {
        self.transition(&[ResponseState::NotStarted], ResponseState::Streaming)
    }

    /// Mark the response complete. An empty result completes straight from
    /// `NotStarted`.
    pub fn complete(&self) -> bool {
        self.transition(
            &[ResponseState::NotStarted, ResponseState::Streaming],
            ResponseState::Completed,
        )
    }

    /// Mark the response failed and return the state it was in.
    pub fn fail(&self) -> ResponseState {
        ResponseState::from_u8(
            self.state
                .swap(ResponseState::Failed as u8, Ordering::AcqRel),
        )
    }

    fn transition(&self, from: &[ResponseState], to: ResponseState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&ResponseState::from_u8(current))
                    .then_some(to as u8)
            })
            .is_ok()
    }
}

impl Default for ResponseProgress {
    fn default() -> Self {
        Self::new()
    }
}
