//! Process-wide and per-request execution contexts.
//!
//! [`GlobalContext`] is built once at startup and shared read-only. Each
//! request derives its own [`ExecutionContext`] from it: settings are copied
//! so per-request changes never leak, while quota counters are shared through
//! the registry.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AuthError, AuthenticationError, AuthorizationError};
use crate::identity::{Identity, DEFAULT_USER};
use crate::quota::{QuotaForIntervals, QuotaRegistry};

/// Query settings a request may adjust without affecting anyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Database used for unqualified table names.
    pub database: String,
    /// Output format requested from the engine.
    pub output_format: String,
    pub max_execution_time: Duration,
    /// Upper bound on returned rows; 0 disables the check.
    pub max_result_rows: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            output_format: "TabSeparated".to_string(),
            max_execution_time: Duration::from_secs(300),
            max_result_rows: 0,
        }
    }
}

/// Stored password of a user.
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    Plain(String),
    /// Lowercase or uppercase hex of the SHA-256 digest.
    Sha256Hex(String),
}

impl Password {
    pub fn verify(&self, candidate: &str) -> bool {
        match self {
            Self::Plain(expected) => expected == candidate,
            Self::Sha256Hex(expected) => {
                let digest = hex::encode(Sha256::digest(candidate.as_bytes()));
                digest.eq_ignore_ascii_case(expected)
            }
        }
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain(<redacted>)"),
            Self::Sha256Hex(_) => f.write_str("Sha256Hex(<redacted>)"),
        }
    }
}

/// A configured user.
#[derive(Debug, Clone, Default)]
pub struct UserEntry {
    pub password: Password,
    /// Quota the user's queries are accounted against.
    pub quota: Option<String>,
    /// Client addresses allowed to connect. Empty allows every address.
    pub allowed_hosts: Vec<IpAddr>,
    /// Overrides the default database.
    pub database: Option<String>,
}

impl UserEntry {
    fn allows_host(&self, host: IpAddr) -> bool {
        let host = host.to_canonical();
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|allowed| allowed.to_canonical() == host)
    }
}

/// User directory.
#[derive(Debug, Clone, Default)]
pub struct Users {
    entries: HashMap<String, UserEntry>,
}

impl Users {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory containing only the passwordless `default` user.
    pub fn with_default_user() -> Self {
        let mut users = Self::new();
        users.insert(DEFAULT_USER, UserEntry::default());
        users
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: UserEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&UserEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide state shared by every request.
#[derive(Debug)]
pub struct GlobalContext {
    settings: Settings,
    users: Arc<Users>,
    quotas: Arc<QuotaRegistry>,
}

impl GlobalContext {
    pub fn new(settings: Settings, users: Users, quotas: QuotaRegistry) -> Self {
        Self {
            settings,
            users: Arc::new(users),
            quotas: Arc::new(quotas),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    pub fn quotas(&self) -> &QuotaRegistry {
        &self.quotas
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new(
            Settings::default(),
            Users::with_default_user(),
            QuotaRegistry::default(),
        )
    }
}

/// Per-request context: owned settings, the bound identity and its quota.
#[derive(Debug)]
pub struct ExecutionContext {
    settings: Settings,
    identity: Identity,
    client_addr: IpAddr,
    quota: Arc<QuotaForIntervals>,
}

impl ExecutionContext {
    /// Bind `identity` connecting from `client_addr` to a copy of the global context.
    ///
    /// Fails with an authentication error for unknown users or bad passwords
    /// and with an authorization error for disallowed hosts or quota problems.
    pub fn derive(
        global: &GlobalContext,
        identity: Identity,
        client_addr: IpAddr,
    ) -> Result<Self, AuthError> {
        let user = global
            .users
            .get(&identity.user)
            .ok_or_else(|| AuthenticationError::UnknownUser(identity.user.clone()))?;

        if !user.password.verify(&identity.password) {
            return Err(AuthenticationError::WrongPassword(identity.user.clone()).into());
        }

        if !user.allows_host(client_addr) {
            return Err(AuthorizationError::HostNotAllowed {
                user: identity.user.clone(),
                host: client_addr,
            }
            .into());
        }

        let quota = match &user.quota {
            Some(name) => global
                .quotas
                .quota_for(name, &identity.user, &identity.quota_key)?,
            None => Arc::new(QuotaForIntervals::unlimited()),
        };

        let mut settings = global.settings.clone();
        if let Some(database) = &user.database {
            settings.database = database.clone();
        }

        Ok(Self {
            settings,
            identity,
            client_addr,
            quota,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn client_addr(&self) -> IpAddr {
        self.client_addr
    }

    pub fn quota(&self) -> &Arc<QuotaForIntervals> {
        &self.quota
    }
}
