//! Caller identity from request parameters and headers.
//!
//! URI parameters `user`, `password` and `quota_key` are read first. Basic
//! credentials in the `Authorization` header override `user` and `password`.
//! The quota key only ever comes from the parameters.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::prelude::*;
use olapgate_core::{Identity, DEFAULT_USER};
use std::collections::HashMap;
use tracing::debug;

/// Resolve the identity of a request. Never fails: missing values default.
pub fn resolve_identity(headers: &HeaderMap, params: &HashMap<String, String>) -> Identity {
    let param = |name: &str| params.get(name).cloned();

    let mut identity = Identity::new(
        param("user").unwrap_or_else(|| DEFAULT_USER.to_string()),
        param("password").unwrap_or_default(),
        param("quota_key").unwrap_or_default(),
    );

    if let Some(value) = headers.get(AUTHORIZATION) {
        match value.to_str().ok().and_then(parse_basic_auth) {
            Some((user, password)) => {
                identity.user = user;
                identity.password = password;
            }
            None => debug!("Ignoring malformed Authorization header"),
        }
    }

    identity
}

/// Decode `Basic <base64(user:password)>`.
fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let mut parts = credentials.splitn(2, ':');
    let user = parts.next()?.to_string();
    let password = parts.next().unwrap_or("").to_string();
    Some((user, password))
}
