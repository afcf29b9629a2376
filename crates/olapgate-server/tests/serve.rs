//! Serving over a real socket.

mod common;

use axum::Router;
use common::{socket_app, Script, ScriptedEngine};
use olapgate_config::GatewayConfig;
use olapgate_core::GatewayError;
use olapgate_server::{build_app, serve};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CONFIG: &str = r#"
[engine]
kind = "memory"

[[engine.fixtures]]
query = "SELECT count() AS cnt FROM default.hits FORMAT TabSeparated"
rows = ["42"]

[users.local]
allowed_hosts = ["127.0.0.1", "::1"]

[users.remote_only]
allowed_hosts = ["10.1.2.3"]
"#;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, app));
    addr
}

async fn spawn_server() -> String {
    let config = GatewayConfig::from_toml_str(CONFIG).unwrap();
    let addr = spawn(build_app(&config).unwrap()).await;
    format!("http://{}", addr)
}

/// Send a raw HTTP/1.1 POST and read until the server closes or resets.
async fn raw_post(addr: SocketAddr, target: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        target,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_secs(10), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => break,
            Ok(Ok(n)) => received.extend_from_slice(&buf[..n]),
            Err(_) => panic!("server neither finished nor aborted the response"),
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

fn failing_engine() -> Arc<ScriptedEngine> {
    ScriptedEngine::new(Script::FailAfter {
        chunks: vec!["a\n", "b\n"],
        error: GatewayError::Runtime {
            message: "lost the source".to_string(),
        },
    })
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_query_over_tcp() {
    let base = spawn_server().await;

    let response = client()
        .post(format!("{}/?user=local", base))
        .body("SELECT cnt FROM hits")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "42\n");
}

#[tokio::test]
async fn test_peer_address_is_checked() {
    let base = spawn_server().await;

    let response = client()
        .post(format!("{}/?user=remote_only", base))
        .body("SELECT cnt FROM hits")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body = response.text().await.unwrap();
    assert!(body.starts_with("Code: 195, "), "{}", body);
}

#[tokio::test]
async fn test_ping_over_tcp() {
    let base = spawn_server().await;
    let body = client()
        .get(format!("{}/ping", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Ok.\n");
}

#[tokio::test]
async fn test_result_is_sent_chunked() {
    let config = GatewayConfig::from_toml_str(CONFIG).unwrap();
    let addr = spawn(build_app(&config).unwrap()).await;

    let response = raw_post(addr, "/?user=local", "SELECT cnt FROM hits").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
    assert!(
        response.to_ascii_lowercase().contains("transfer-encoding: chunked\r\n"),
        "{}",
        response
    );
    assert!(response.ends_with("0\r\n\r\n"), "{}", response);
}

#[tokio::test]
async fn test_mid_stream_failure_aborts_connection() {
    let addr = spawn(socket_app(failing_engine())).await;

    let response = raw_post(addr, "/", "SELECT cnt FROM table1").await;

    // Buffered output may be dropped with the connection, but never terminated.
    if !response.is_empty() {
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response);
    }
    assert!(!response.ends_with("0\r\n\r\n"), "{}", response);
}

#[tokio::test]
async fn test_mid_stream_failure_is_a_client_error() {
    let addr = spawn(socket_app(failing_engine())).await;

    let sent = client()
        .post(format!("http://{}/", addr))
        .body("SELECT cnt FROM table1")
        .send()
        .await;

    // The abort can land before or after the status line is parsed.
    if let Ok(response) = sent {
        assert_eq!(response.status(), 200);
        assert!(response.text().await.is_err());
    }
}
