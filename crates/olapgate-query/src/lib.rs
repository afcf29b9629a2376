//! Legacy OLAP query front end.
//!
//! The legacy language is a small `SELECT ... FROM ...` dialect. This crate
//! parses request bodies into a [`LegacyQuery`] and renders that query as
//! SQL for the downstream engine:
//!
//! ```text
//! body bytes -> LegacyParser -> LegacyQuery -> SqlTranslator -> SQL text
//! ```

pub mod ast;
pub mod parser;
pub mod translate;

pub use ast::{CompareOp, Condition, LegacyQuery, Literal, OrderBy, Projection, SortDirection, TableRef};
pub use parser::{parse_query, LegacyParser};
pub use translate::{AttributeCatalog, SqlTranslator};
