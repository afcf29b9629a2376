//! Front end collaborators: parsing the legacy language and translating it.

use crate::context::ExecutionContext;
use crate::error::{ParseError, TranslationError};

/// Parses a raw request body into a structured legacy query.
pub trait QueryParser: Send + Sync {
    /// Structured representation produced by this parser.
    type Query: Send + Sync;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn parse(&self, body: &[u8]) -> Result<Self::Query, ParseError>;
}

/// Renders a structured query as text the execution engine accepts.
///
/// Translation may consult the request context (current database, output
/// format, limits) but never mutates it.
pub trait QueryTranslator<Q>: Send + Sync {
    fn name(&self) -> &'static str;

    fn translate(&self, query: &Q, ctx: &ExecutionContext) -> Result<String, TranslationError>;
}
