//! Error taxonomy for the automation platform.
//!
//! Storage code works with `anyhow::Result` and adds context at each call
//! site. Public operations return [`AreaError`] so callers (the dispatch
//! engine, the HTTP layer) can branch on the failure class.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AreaError {
    /// Provider client id/secret (or another per-environment value) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing or malformed caller input (authorization code, option payload, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The provider rejected a code/token exchange or a token was revoked.
    #[error("upstream authorization error: {0}")]
    UpstreamAuth(String),

    /// Unknown Area, Service, Action, Reaction, User or Credential.
    #[error("{0} not found")]
    NotFound(String),

    /// Network failure or 5xx from a provider.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Duplicate capability registration, duplicate email, ...
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Caller session token missing or invalid.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl AreaError {
    /// True for failures worth retrying on the next tick without escalation.
    pub fn is_transient(&self) -> bool {
        matches!(self, AreaError::TransientUpstream(_))
    }

    /// True when the provider persistently refuses our credentials.
    pub fn is_upstream_rejection(&self) -> bool {
        matches!(self, AreaError::UpstreamAuth(_))
    }
}
