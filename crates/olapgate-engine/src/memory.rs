//! Fixture backed engine.
//!
//! Answers queries from a table of canned results keyed by normalized query
//! text. Useful for local runs and for exercising the HTTP pipeline without
//! a downstream server.

use async_trait::async_trait;
use bytes::Bytes;
use olapgate_core::{
    Execution, ExecutionContext, ExecutionError, ExecutionStats, GatewayError, LeafStats,
    QueryEngine,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::handle::PlanHandle;
use crate::producer::spawn_producer;

/// Canned result for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixture {
    pub query: String,
    /// Serialized output rows, without trailing newlines.
    pub rows: Vec<String>,
    /// Rows and bytes reported as read by the source.
    pub read_rows: u64,
    pub read_bytes: u64,
}

impl Fixture {
    pub fn new(query: impl Into<String>, rows: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let rows: Vec<String> = rows.into_iter().map(Into::into).collect();
        let read_bytes = rows.iter().map(|r| r.len() as u64 + 1).sum();
        Self {
            query: query.into(),
            read_rows: rows.len() as u64,
            read_bytes,
            rows,
        }
    }

    pub fn with_read_stats(mut self, rows: u64, bytes: u64) -> Self {
        self.read_rows = rows;
        self.read_bytes = bytes;
        self
    }
}

/// Collapse whitespace and drop a trailing `;`.
pub fn normalize_query(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(';').trim_end().to_string()
}

/// Engine serving [`Fixture`]s.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    fixtures: HashMap<String, Arc<Fixture>>,
    rows_per_chunk: usize,
    channel_capacity: usize,
}

impl MemoryEngine {
    pub fn new(rows_per_chunk: usize, channel_capacity: usize) -> Self {
        Self {
            fixtures: HashMap::new(),
            rows_per_chunk: rows_per_chunk.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn insert(&mut self, fixture: Fixture) {
        self.fixtures
            .insert(normalize_query(&fixture.query), Arc::new(fixture));
    }

    pub fn with_fixture(mut self, fixture: Fixture) -> Self {
        self.insert(fixture);
        self
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(64, 16)
    }
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(
        &self,
        query: &str,
        ctx: &ExecutionContext,
    ) -> Result<Execution, GatewayError> {
        let quota = Arc::clone(ctx.quota());
        let now = SystemTime::now();
        quota.start_query(now).map_err(ExecutionError::from)?;

        let Some(fixture) = self.fixtures.get(&normalize_query(query)).cloned() else {
            quota.add_error(now);
            return Err(ExecutionError::NoSuchQuery(query.to_string()).into());
        };

        let plan = format!(
            "Expression (serialize {} rows)\n  MemorySource (read {} rows, {} bytes)",
            fixture.rows.len(),
            fixture.read_rows,
            fixture.read_bytes
        );
        let stats = Arc::new(ExecutionStats::new());
        let producer_stats = Arc::clone(&stats);
        let rows_per_chunk = self.rows_per_chunk;
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let output = spawn_producer(self.channel_capacity, cancel.clone(), move |sender| {
            async move {
                let mut result_rows = 0u64;
                let mut result_bytes = 0u64;

                let streamed = async {
                    for rows in fixture.rows.chunks(rows_per_chunk) {
                        let mut chunk = String::new();
                        for row in rows {
                            chunk.push_str(row);
                            chunk.push('\n');
                        }
                        result_rows += rows.len() as u64;
                        result_bytes += chunk.len() as u64;
                        sender.send(Bytes::from(chunk)).await?;
                    }
                    Ok::<(), ExecutionError>(())
                }
                .await;

                let now = SystemTime::now();
                quota.add_execution_time(now, started.elapsed());
                if let Err(err) = streamed {
                    debug!(rows = result_rows, "Memory producer stopped early");
                    return Err(GatewayError::from(err));
                }

                producer_stats.finish_with(LeafStats {
                    rows: fixture.read_rows,
                    bytes: fixture.read_bytes,
                });
                quota.add_read(now, fixture.read_rows, fixture.read_bytes);
                quota.add_result(now, result_rows, result_bytes);
                Ok(())
            }
        });

        Ok(Execution::new(output, cancel).with_handle(PlanHandle::new(plan, stats)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use olapgate_core::{ErrorCode, GlobalContext, Identity};
    use std::net::{IpAddr, Ipv4Addr};
    use test_case::test_case;

    fn ctx() -> ExecutionContext {
        ExecutionContext::derive(
            &GlobalContext::default(),
            Identity::default(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
        .unwrap()
    }

    fn numbers(n: usize) -> Fixture {
        Fixture::new("SELECT n FROM default.numbers FORMAT TabSeparated", (0..n).map(|i| i.to_string()))
    }

    #[test_case("SELECT  a\n FROM t;", "SELECT a FROM t" ; "whitespace and semicolon")]
    #[test_case("SELECT a FROM t ; ", "SELECT a FROM t" ; "spaced semicolon")]
    #[test_case("SELECT a FROM t", "SELECT a FROM t" ; "already normal")]
    fn test_normalize_query(input: &str, expected: &str) {
        assert_eq!(normalize_query(input), expected);
    }

    #[tokio::test]
    async fn test_streams_fixture_in_chunks() {
        let engine = MemoryEngine::new(2, 4).with_fixture(numbers(5));
        let execution = engine
            .execute("SELECT n FROM default.numbers FORMAT TabSeparated", &ctx())
            .await
            .unwrap();

        let handle = execution.handle.unwrap();
        let chunks: Vec<Bytes> = execution
            .output
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Bytes::from_static(b"0\n1\n"));
        assert_eq!(chunks[2], Bytes::from_static(b"4\n"));
        assert_eq!(handle.leaf_rows_bytes().unwrap(), LeafStats { rows: 5, bytes: 10 });
        assert!(handle.plan_dump().contains("MemorySource"));
    }

    #[tokio::test]
    async fn test_stats_not_ready_before_drain() {
        let engine = MemoryEngine::new(1, 1).with_fixture(numbers(100));
        let execution = engine
            .execute("SELECT n FROM default.numbers FORMAT TabSeparated", &ctx())
            .await
            .unwrap();

        let handle = execution.handle.unwrap();
        assert!(handle.leaf_rows_bytes().is_err());
        execution.cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_query() {
        let engine = MemoryEngine::default();
        let err = engine.execute("SELECT 1", &ctx()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UNKNOWN_TABLE);
    }

    #[tokio::test]
    async fn test_cancel_ends_stream() {
        let engine = MemoryEngine::new(1, 1).with_fixture(numbers(1000));
        let execution = engine
            .execute("SELECT n FROM default.numbers FORMAT TabSeparated", &ctx())
            .await
            .unwrap();

        let mut output = execution.output;
        for _ in 0..10 {
            assert!(output.next().await.unwrap().is_ok());
        }
        execution.cancel.cancel();

        let remaining = output.count().await;
        assert!(remaining < 5, "stream continued after cancel: {}", remaining);
        assert!(execution.handle.unwrap().leaf_rows_bytes().is_err());
    }
}
