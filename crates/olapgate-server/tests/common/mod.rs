//! Shared fixtures for HTTP level tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use olapgate_core::{
    Execution, ExecutionContext, GatewayError, GlobalContext, QueryEngine, QuotaRegistry,
    Settings, Users,
};
use olapgate_engine::spawn_producer;
use olapgate_query::{LegacyParser, SqlTranslator};
use olapgate_server::{router, Gateway, RequestLimits};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const CLIENT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 40000);

/// What a [`ScriptedEngine`] does when asked to execute.
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream `count` rows, one per chunk.
    Rows { count: usize },
    /// Stream the given chunks, then fail with `error`.
    FailAfter {
        chunks: Vec<&'static str>,
        error: GatewayError,
    },
    /// Fail before any output.
    Fail(GatewayError),
    /// Panic inside `execute` with a string message.
    Panic(&'static str),
    /// Panic inside `execute` with a non-string payload.
    PanicOpaque,
    /// Never produce anything.
    Stall,
}

/// Engine following a [`Script`] and remembering what it was asked.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: Script,
    queries: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            queries: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn last_token(&self) -> Option<CancellationToken> {
        self.tokens.lock().last().cloned()
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        query: &str,
        _ctx: &ExecutionContext,
    ) -> Result<Execution, GatewayError> {
        self.queries.lock().push(query.to_string());
        let cancel = CancellationToken::new();
        self.tokens.lock().push(cancel.clone());

        let output = match self.script.clone() {
            Script::Rows { count } => spawn_producer(1, cancel.clone(), move |sender| async move {
                for i in 0..count {
                    sender.send(Bytes::from(format!("{}\n", i))).await?;
                }
                Ok(())
            }),
            Script::FailAfter { chunks, error } => {
                spawn_producer(4, cancel.clone(), move |sender| async move {
                    for chunk in chunks {
                        sender.send(Bytes::from_static(chunk.as_bytes())).await?;
                    }
                    Err(error)
                })
            }
            Script::Fail(error) => return Err(error),
            Script::Panic(message) => panic!("{}", message),
            Script::PanicOpaque => std::panic::panic_any(7_u32),
            Script::Stall => spawn_producer(1, cancel.clone(), |_sender| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        };

        Ok(Execution::new(output, cancel))
    }
}

pub fn global(settings: Settings, users: Users, quotas: QuotaRegistry) -> Arc<GlobalContext> {
    Arc::new(GlobalContext::new(settings, users, quotas))
}

pub fn default_global() -> Arc<GlobalContext> {
    global(
        Settings::default(),
        Users::with_default_user(),
        QuotaRegistry::default(),
    )
}

pub fn app_with(
    global: Arc<GlobalContext>,
    engine: Arc<dyn QueryEngine>,
    limits: RequestLimits,
) -> Router {
    let gateway = Gateway::new(global, LegacyParser, SqlTranslator::default(), engine, limits);
    router(Arc::new(gateway), true).layer(MockConnectInfo(SocketAddr::from(CLIENT_ADDR)))
}

/// Router for a real listener, where the peer address comes from the socket.
pub fn socket_app(engine: Arc<dyn QueryEngine>) -> Router {
    let gateway = Gateway::new(
        default_global(),
        LegacyParser,
        SqlTranslator::default(),
        engine,
        RequestLimits::default(),
    );
    router(Arc::new(gateway), true)
}

pub fn app(engine: Arc<dyn QueryEngine>) -> Router {
    app_with(default_global(), engine, RequestLimits::default())
}

pub fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
