//! HTTP front end of the olapgate legacy query gateway.
//!
//! A request body in the legacy query language is parsed, translated to SQL,
//! executed by the configured engine and streamed back as tab separated
//! values. See [`pipeline::Gateway`] for the request flow and
//! [`writer::ResponseWriter`] for streaming and cancellation.

pub mod bootstrap;
pub mod cli;
pub mod credentials;
pub mod error;
pub mod error_map;
pub mod instrument;
pub mod pipeline;
pub mod progress;
pub mod quota_report;
pub mod routes;
pub mod server;
pub mod writer;

pub use bootstrap::{build_app, build_gateway, LegacyGateway};
pub use error::{RequestError, Result, ServerError};
pub use error_map::{ErrorMapper, ErrorReport};
pub use pipeline::{Gateway, RequestLimits};
pub use progress::{ResponseProgress, ResponseState};
pub use routes::router;
pub use server::{serve, start_server};
