//! Resolved caller identity.

use std::fmt;

/// User name assumed when a request carries no credentials.
pub const DEFAULT_USER: &str = "default";

/// Who is running a query.
///
/// Resolved once per request. The password is never printed: the `Debug`
/// implementation redacts it so an identity can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub password: String,
    pub quota_key: String,
}

impl Identity {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        quota_key: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            quota_key: quota_key.into(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(DEFAULT_USER, "", "")
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("quota_key", &self.quota_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity() {
        let identity = Identity::default();
        assert_eq!(identity.user, "default");
        assert_eq!(identity.password, "");
        assert_eq!(identity.quota_key, "");
    }

    #[test]
    fn test_debug_redacts_password() {
        let identity = Identity::new("alice", "hunter2", "team-a");
        let rendered = format!("{:?}", identity);
        assert!(rendered.contains("alice"));
        assert!(rendered.contains("team-a"));
        assert!(!rendered.contains("hunter2"));
    }
}
