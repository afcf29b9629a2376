//! Building a gateway from configuration.

use axum::Router;
use olapgate_config::{EngineConfig, EngineKind, GatewayConfig, QuotaConfig, UserConfig};
use olapgate_core::{
    GlobalContext, Password, QueryEngine, QuotaInterval, QuotaLimits, QuotaRegistry, QuotaSpec,
    Settings, UserEntry, Users,
};
use olapgate_engine::{Fixture, MemoryEngine, RemoteEngine};
use olapgate_query::{AttributeCatalog, LegacyParser, SqlTranslator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::pipeline::{Gateway, RequestLimits};
use crate::routes::router;

/// The gateway as deployed: legacy language in, SQL out.
pub type LegacyGateway = Gateway<LegacyParser, SqlTranslator>;

pub fn build_settings(config: &GatewayConfig) -> Settings {
    let settings = &config.settings;
    Settings {
        database: settings.database.clone(),
        output_format: settings.output_format.clone(),
        max_execution_time: Duration::from_secs(settings.max_execution_time_secs),
        max_result_rows: settings.max_result_rows,
    }
}

fn user_entry(user: &UserConfig) -> UserEntry {
    let password = match &user.password_sha256_hex {
        Some(hash) => Password::Sha256Hex(hash.clone()),
        None => Password::Plain(user.password.clone().unwrap_or_default()),
    };
    UserEntry {
        password,
        quota: user.quota.clone(),
        allowed_hosts: user.allowed_hosts.clone(),
        database: user.database.clone(),
    }
}

/// Configured users, or only the passwordless `default` user if none are.
pub fn build_users(config: &GatewayConfig) -> Users {
    if config.users.is_empty() {
        return Users::with_default_user();
    }
    let mut users = Users::new();
    for (name, user) in &config.users {
        users.insert(name.clone(), user_entry(user));
    }
    users
}

fn quota_spec(name: &str, quota: &QuotaConfig) -> QuotaSpec {
    let intervals = quota
        .intervals
        .iter()
        .map(|interval| QuotaInterval {
            duration: Duration::from_secs(interval.duration_secs),
            limits: QuotaLimits {
                queries: interval.queries,
                errors: interval.errors,
                result_rows: interval.result_rows,
                read_rows: interval.read_rows,
                execution_time: Duration::from_secs(interval.execution_time_secs),
            },
        })
        .collect();

    QuotaSpec {
        name: name.to_string(),
        keyed: quota.keyed,
        intervals,
    }
}

pub fn build_quotas(config: &GatewayConfig) -> QuotaRegistry {
    QuotaRegistry::new(
        config
            .quotas
            .iter()
            .map(|(name, quota)| quota_spec(name, quota)),
    )
}

pub fn build_global_context(config: &GatewayConfig) -> GlobalContext {
    GlobalContext::new(
        build_settings(config),
        build_users(config),
        build_quotas(config),
    )
}

/// Built-in attributes plus the configured ones, which win on conflict.
pub fn build_translator(config: &GatewayConfig) -> SqlTranslator {
    let mut catalog = AttributeCatalog::default();
    for (name, expression) in &config.attributes {
        catalog.insert(name.clone(), expression.clone());
    }
    SqlTranslator::new(catalog)
}

pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn QueryEngine>> {
    match config.kind {
        EngineKind::Remote => {
            let engine = RemoteEngine::new(
                config.url.clone(),
                Duration::from_secs(config.connect_timeout_secs),
                config.channel_capacity,
            )
            .map_err(|source| ServerError::Engine {
                engine: "remote",
                source,
            })?;
            info!(url = %config.url, "Using remote engine");
            Ok(Arc::new(engine))
        }
        EngineKind::Memory => {
            let mut engine = MemoryEngine::new(config.rows_per_chunk, config.channel_capacity);
            for fixture in &config.fixtures {
                let mut canned = Fixture::new(fixture.query.clone(), fixture.rows.iter().cloned());
                if fixture.read_rows > 0 || fixture.read_bytes > 0 {
                    canned = canned.with_read_stats(fixture.read_rows, fixture.read_bytes);
                }
                debug!(query = %canned.query, rows = canned.rows.len(), "Loaded fixture");
                engine.insert(canned);
            }
            info!(fixtures = engine.len(), "Using memory engine");
            Ok(Arc::new(engine))
        }
    }
}

pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<LegacyGateway>> {
    Ok(Arc::new(Gateway::new(
        Arc::new(build_global_context(config)),
        LegacyParser,
        build_translator(config),
        build_engine(&config.engine)?,
        RequestLimits {
            max_body_size: config.server.max_body_size,
        },
    )))
}

/// Validated config to ready-to-serve router.
pub fn build_app(config: &GatewayConfig) -> Result<Router> {
    config.validate()?;
    let gateway = build_gateway(config)?;
    Ok(router(gateway, config.server.enable_health_routes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use olapgate_core::{ExecutionContext, Identity, QueryTranslator};
    use std::net::{IpAddr, Ipv4Addr};

    const CONFIG: &str = r#"
[settings]
database = "stats"
max_execution_time_secs = 30

[engine]
kind = "memory"

[[engine.fixtures]]
query = "SELECT uniq(UserID) AS users FROM stats.hits FORMAT TabSeparated"
rows = ["7"]

[attributes]
users = "uniq(UserID)"

[users.alice]
password_sha256_hex = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
quota = "hourly"

[quotas.hourly]
[[quotas.hourly.intervals]]
duration_secs = 3600
queries = 5
"#;

    fn config() -> GatewayConfig {
        GatewayConfig::from_toml_str(CONFIG).unwrap()
    }

    #[test]
    fn test_settings_from_config() {
        let settings = build_settings(&config());
        assert_eq!(settings.database, "stats");
        assert_eq!(settings.max_execution_time, Duration::from_secs(30));
    }

    #[test]
    fn test_users_and_quota() {
        let global = build_global_context(&config());
        assert!(global.users().get("default").is_none());
        assert!(global.quotas().contains("hourly"));

        let ctx = ExecutionContext::derive(
            &global,
            Identity::new("alice", "secret", ""),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
        .unwrap();
        assert_eq!(ctx.quota().name(), "hourly");
    }

    #[test]
    fn test_default_user_without_users_section() {
        let users = build_users(&GatewayConfig::default());
        assert_eq!(users.len(), 1);
        assert!(users.get("default").is_some());
    }

    #[test]
    fn test_translator_uses_configured_attributes() {
        let config = config();
        let global = build_global_context(&config);
        let ctx = ExecutionContext::derive(
            &global,
            Identity::new("alice", "secret", ""),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
        .unwrap();
        let query = olapgate_query::parse_query("SELECT users FROM hits").unwrap();

        let sql = build_translator(&config).translate(&query, &ctx).unwrap();
        assert_eq!(
            sql,
            "SELECT uniq(UserID) AS users FROM stats.hits FORMAT TabSeparated"
        );
    }

    #[test]
    fn test_memory_engine_from_config() {
        let engine = build_engine(&config().engine).unwrap();
        assert_eq!(engine.name(), "memory");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.server.max_body_size = 0;
        assert!(matches!(build_app(&config), Err(ServerError::Config(_))));
    }
}
