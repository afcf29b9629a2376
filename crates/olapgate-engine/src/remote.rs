//! Downstream HTTP SQL engine.
//!
//! The translated query is POSTed as the request body. The caller's identity
//! travels as Basic credentials plus `database` and `quota_key` parameters,
//! so the downstream server applies its own access control and quotas. The
//! response body is streamed through without buffering.

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use olapgate_core::{
    ErrorCode, Execution, ExecutionContext, ExecutionError, ExecutionStats, GatewayError,
    LeafStats, QueryEngine,
};
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::handle::PlanHandle;
use crate::producer::spawn_producer;

/// Response header carrying the downstream read statistics as JSON.
pub const SUMMARY_HEADER: &str = "X-ClickHouse-Summary";

static ERROR_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Code: (\d+)").expect("valid error code regex"));

/// Engine forwarding queries to a downstream server over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteEngine {
    client: reqwest::Client,
    url: String,
    channel_capacity: usize,
}

impl RemoteEngine {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        channel_capacity: usize,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| library_error(&e))?;
        Ok(Self::with_client(client, url, channel_capacity))
    }

    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            channel_capacity: channel_capacity.max(1),
        }
    }

}

#[async_trait]
impl QueryEngine for RemoteEngine {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn execute(
        &self,
        query: &str,
        ctx: &ExecutionContext,
    ) -> Result<Execution, GatewayError> {
        let quota = Arc::clone(ctx.quota());
        let now = SystemTime::now();
        quota.start_query(now).map_err(ExecutionError::from)?;

        let identity = ctx.identity();
        let settings = ctx.settings();
        let mut params = vec![
            ("database", settings.database.clone()),
            (
                "max_execution_time",
                settings.max_execution_time.as_secs().to_string(),
            ),
        ];
        if !identity.quota_key.is_empty() {
            params.push(("quota_key", identity.quota_key.clone()));
        }

        debug!(
            url = %self.url,
            user = %identity.user,
            client = %ctx.client_addr(),
            "Sending query to remote server"
        );
        let response = match self
            .client
            .post(&self.url)
            .basic_auth(&identity.user, Some(&identity.password))
            .query(&params)
            .body(query.to_string())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                quota.add_error(now);
                return Err(library_error(&err));
            }
        };

        let status = response.status();
        if !status.is_success() {
            quota.add_error(now);
            let message = match response.text().await {
                Ok(message) => message,
                Err(err) => {
                    debug!(error = %err, status = %status, "Failed to read remote error body");
                    String::new()
                }
            };
            return Err(remote_error(status.as_u16(), &message).into());
        }

        let summary = response
            .headers()
            .get(SUMMARY_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_summary);

        let plan = format!("RemoteSource ({})\n  {}", self.url, query);
        let stats = Arc::new(ExecutionStats::new());
        let producer_stats = Arc::clone(&stats);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let output = spawn_producer(self.channel_capacity, cancel.clone(), move |sender| {
            async move {
                let mut body = response.bytes_stream();
                let mut result_rows = 0u64;
                let mut result_bytes = 0u64;

                let streamed = async {
                    while let Some(chunk) = body.next().await {
                        let chunk = chunk.map_err(|e| library_error(&e))?;
                        result_rows += chunk.iter().filter(|b| **b == b'\n').count() as u64;
                        result_bytes += chunk.len() as u64;
                        sender.send(chunk).await?;
                    }
                    Ok::<(), GatewayError>(())
                }
                .await;

                let now = SystemTime::now();
                quota.add_execution_time(now, started.elapsed());
                if let Err(err) = streamed {
                    // A client disconnect cancels the stream and is not an error.
                    if sender.is_cancelled() {
                        debug!(rows = result_rows, "Remote stream stopped after cancellation");
                    } else {
                        quota.add_error(now);
                    }
                    return Err(err);
                }

                let leaf = summary.unwrap_or(LeafStats {
                    rows: result_rows,
                    bytes: result_bytes,
                });
                producer_stats.finish_with(leaf);
                quota.add_read(now, leaf.rows, leaf.bytes);
                quota.add_result(now, result_rows, result_bytes);
                Ok(())
            }
        });

        Ok(Execution::new(output, cancel).with_handle(PlanHandle::new(plan, stats)))
    }
}

fn library_error(err: &reqwest::Error) -> GatewayError {
    let code = err.status().map(|s| i32::from(s.as_u16())).unwrap_or(0);
    GatewayError::library(code, err)
}

/// Map a non-2xx response, keeping the remote `Code: N` when present.
fn remote_error(status: u16, message: &str) -> ExecutionError {
    let code = ERROR_CODE_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .map(ErrorCode)
        .unwrap_or(ErrorCode::RECEIVED_ERROR_FROM_REMOTE_IO_SERVER);

    ExecutionError::Remote {
        code,
        status,
        message: message.trim().to_string(),
    }
}

/// Read `read_rows` / `read_bytes` from the summary header.
///
/// Values may be JSON numbers or numeric strings.
fn parse_summary(header: &str) -> Option<LeafStats> {
    let summary: serde_json::Value = serde_json::from_str(header).ok()?;
    let field = |name: &str| match summary.get(name)? {
        serde_json::Value::String(s) => s.parse::<u64>().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    };
    Some(LeafStats {
        rows: field("read_rows")?,
        bytes: field("read_bytes")?,
    })
}
