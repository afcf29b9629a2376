//! Execution engines.
//!
//! Both engines run their producer in a spawned task that pushes result
//! chunks into a bounded channel. The HTTP layer pulls from the channel at
//! the pace of the client, and fires the execution's cancellation token if
//! the client disconnects.
//!
//! - [`RemoteEngine`] forwards translated SQL to a downstream HTTP server
//! - [`MemoryEngine`] answers from canned fixtures

mod handle;
pub mod memory;
pub mod producer;
pub mod remote;

pub use handle::PlanHandle;
pub use memory::{normalize_query, Fixture, MemoryEngine};
pub use producer::{spawn_producer, ChunkSender};
pub use remote::RemoteEngine;
