//! Request pipeline.
//!
//! ```text
//! request -> body -> identity -> ExecutionContext -> parse -> translate
//!         -> engine.execute -> first chunk -> 200 + ResponseWriter
//! ```
//!
//! Any failure before the first chunk becomes a 500 response with an error
//! body. Panics anywhere in the pipeline are caught and classified the same
//! way.

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, Request};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::{FutureExt, StreamExt};
use olapgate_core::{
    Execution, ExecutionContext, ExecutionError, GatewayError, GlobalContext, QueryEngine,
    QueryParser, QueryTranslator, QuotaForIntervals, ResultStream,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::credentials::resolve_identity;
use crate::error::RequestError;
use crate::error_map::ErrorMapper;
use crate::instrument::Stopwatch;
use crate::progress::ResponseProgress;
use crate::writer::{Completion, ResponseWriter, WriterParts};

const TAB_SEPARATED: &str = "text/tab-separated-values; charset=UTF-8";

/// Limits applied before a request reaches the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    /// Largest accepted body in bytes.
    pub max_body_size: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Everything needed to answer legacy query requests.
pub struct Gateway<P, T> {
    global: Arc<GlobalContext>,
    parser: P,
    translator: T,
    engine: Arc<dyn QueryEngine>,
    limits: RequestLimits,
    mapper: ErrorMapper,
}

impl<P, T> Gateway<P, T>
where
    P: QueryParser + 'static,
    T: QueryTranslator<P::Query> + 'static,
{
    pub fn new(
        global: Arc<GlobalContext>,
        parser: P,
        translator: T,
        engine: Arc<dyn QueryEngine>,
        limits: RequestLimits,
    ) -> Self {
        Self {
            global,
            parser,
            translator,
            engine,
            limits,
            mapper: ErrorMapper,
        }
    }

    /// Answer one request. Never fails: errors become error responses.
    pub async fn handle(&self, request: Request) -> Response {
        let progress = ResponseProgress::new();
        let mut quota = None;

        let outcome = AssertUnwindSafe(self.process_query(request, &progress, &mut quota))
            .catch_unwind()
            .await;

        let err = match outcome {
            Ok(Ok(response)) => return response,
            Ok(Err(err)) => err,
            Err(payload) => GatewayError::from_panic(payload),
        };

        let response = self
            .mapper
            .fail(&progress, &err)
            .unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        if let Some(quota) = quota {
            crate::quota_report::report(&quota);
        }
        response
    }

    /// `quota` is filled in once an execution context exists, and cleared
    /// again when the response writer takes over reporting.
    async fn process_query(
        &self,
        request: Request,
        progress: &ResponseProgress,
        quota: &mut Option<Arc<QuotaForIntervals>>,
    ) -> Result<Response, GatewayError> {
        let client_addr = client_addr(&request);
        let (parts, body) = request.into_parts();

        trace!(uri = %parts.uri, version = ?parts.version, "Request URI");
        let body = read_body(body, &parts.headers, self.limits.max_body_size).await?;
        trace!("Request body: {}", String::from_utf8_lossy(&body));

        let params = query_params(&parts.uri);
        let identity = resolve_identity(&parts.headers, &params);
        let ctx = ExecutionContext::derive(&self.global, identity, client_addr)?;
        *quota = Some(Arc::clone(ctx.quota()));

        let query = self.parser.parse(&body)?;
        let translated = self.translator.translate(&query, &ctx)?;
        trace!(
            parser = self.parser.name(),
            translator = self.translator.name(),
            engine = self.engine.name(),
            "Converted query: {}",
            translated
        );

        let limit = ctx.settings().max_execution_time;
        let deadline = Instant::now() + limit;
        let stopwatch = Stopwatch::start();
        let started = timeout_at(deadline, async {
            let execution = self.engine.execute(&translated, &ctx).await?;
            let guard = execution.cancel.clone().drop_guard();
            let Execution {
                mut output, handle, ..
            } = execution;
            let first = first_chunk(&mut output).await?;
            Ok::<_, GatewayError>((output, handle, guard, first))
        })
        .await;
        let (output, handle, guard, first) = match started {
            Ok(started) => started?,
            Err(_) => return Err(ExecutionError::Timeout { limit }.into()),
        };

        let completion = Completion::new(Arc::clone(ctx.quota()), stopwatch);
        *quota = None;

        let Some(first) = first else {
            guard.disarm();
            progress.complete();
            completion.finish(handle.as_deref());
            return Ok(ok_response(Body::empty()));
        };

        let writer = ResponseWriter::new(
            first,
            WriterParts {
                output,
                handle,
                cancel_guard: guard,
                completion,
                deadline,
                limit,
            },
            progress.clone(),
            self.mapper,
        );
        Ok(ok_response(Body::from_stream(writer)))
    }
}

fn ok_response(body: Body) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, TAB_SEPARATED)], body).into_response()
}

fn client_addr(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn query_params(uri: &Uri) -> HashMap<String, String> {
    match Query::<HashMap<String, String>>::try_from_uri(uri) {
        Ok(Query(params)) => params,
        Err(err) => {
            debug!(error = %err, "Ignoring malformed query string");
            HashMap::new()
        }
    }
}

/// Read the whole body, refusing anything above `limit` bytes.
async fn read_body(body: Body, headers: &HeaderMap, limit: usize) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(RequestError::BodyTooLarge { limit }.into());
    }

    let mut data = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(|e| GatewayError::library(0, &e))?;
        if buf.len() + chunk.len() > limit {
            return Err(RequestError::BodyTooLarge { limit }.into());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Next non-empty chunk, or `None` when the result is empty.
async fn first_chunk(output: &mut ResultStream) -> Result<Option<Bytes>, GatewayError> {
    while let Some(chunk) = output.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            return Ok(Some(chunk));
        }
    }
    Ok(None)
}
