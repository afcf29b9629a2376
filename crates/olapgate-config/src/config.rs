//! Configuration sections.
//!
//! Every section implements `Default`, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Root of `olapgate.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub settings: SettingsConfig,
    pub engine: EngineConfig,
    /// Legacy attribute name to target SQL expression.
    pub attributes: BTreeMap<String, String>,
    pub users: BTreeMap<String, UserConfig>,
    pub quotas: BTreeMap<String, QuotaConfig>,
}

/// HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
    /// Serve `/ping` and `/health` next to the query endpoint.
    pub enable_health_routes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            max_body_size: 10 * 1024 * 1024,
            enable_health_routes: true,
        }
    }
}

/// Default query settings copied into every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettingsConfig {
    pub database: String,
    pub output_format: String,
    pub max_execution_time_secs: u64,
    /// 0 disables the check.
    pub max_result_rows: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            output_format: "TabSeparated".to_string(),
            max_execution_time_secs: 300,
            max_result_rows: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Forward to a downstream HTTP SQL server.
    #[default]
    Remote,
    /// Serve canned results from `fixtures`.
    Memory,
}

/// Execution engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Downstream endpoint for the remote engine.
    pub url: String,
    pub connect_timeout_secs: u64,
    /// Result chunks buffered between producer and response writer.
    pub channel_capacity: usize,
    /// Rows per chunk for the memory engine.
    pub rows_per_chunk: usize,
    pub fixtures: Vec<FixtureConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Remote,
            url: "http://127.0.0.1:8123/".to_string(),
            connect_timeout_secs: 10,
            channel_capacity: 16,
            rows_per_chunk: 64,
            fixtures: Vec::new(),
        }
    }
}

/// Canned result for the memory engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixtureConfig {
    /// Translated query text this fixture answers.
    pub query: String,
    /// Output rows, already serialized.
    pub rows: Vec<String>,
    pub read_rows: u64,
    pub read_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserConfig {
    pub password: Option<String>,
    pub password_sha256_hex: Option<String>,
    pub quota: Option<String>,
    /// Empty allows every address.
    pub allowed_hosts: Vec<IpAddr>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuotaConfig {
    /// Count usage per client supplied quota key instead of per user.
    pub keyed: bool,
    pub intervals: Vec<QuotaIntervalConfig>,
}

/// Limits of one quota interval. 0 means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuotaIntervalConfig {
    pub duration_secs: u64,
    pub queries: u64,
    pub errors: u64,
    pub result_rows: u64,
    pub read_rows: u64,
    pub execution_time_secs: u64,
}
