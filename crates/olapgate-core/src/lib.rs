//! Core types for the olapgate query gateway.
//!
//! This crate holds everything the pipeline stages agree on:
//!
//! - [`identity`]: the resolved caller
//! - [`context`]: global and per-request execution contexts, users, settings
//! - [`quota`]: interval based usage accounting
//! - [`error`]: stage errors and the origin-tagged [`GatewayError`]
//! - [`query`] and [`execution`]: the collaborator traits implemented by the
//!   parser, translator and engine crates

pub mod context;
pub mod error;
pub mod execution;
pub mod identity;
pub mod query;
pub mod quota;

pub use context::{ExecutionContext, GlobalContext, Password, Settings, UserEntry, Users};
pub use error::{
    AuthError, AuthenticationError, AuthorizationError, ErrorCode, ErrorOrigin, ExecutionError,
    GatewayError, ParseError, Position, TranslationError,
};
pub use execution::{
    Execution, ExecutionHandle, ExecutionStats, LeafStats, QueryEngine, ResultStream, StatsError,
};
pub use identity::{Identity, DEFAULT_USER};
pub use query::{QueryParser, QueryTranslator};
pub use quota::{
    QuotaExceeded, QuotaForIntervals, QuotaInterval, QuotaLimits, QuotaRegistry, QuotaSpec,
    QuotaUsage,
};
