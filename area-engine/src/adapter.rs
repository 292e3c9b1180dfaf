//! Service adapter contract.
//!
//! Every integrated provider implements [`ServiceAdapter`]. An adapter
//! publishes static metadata about its Actions and Reactions and hands out one
//! handler per capability name. Handlers never sleep or schedule themselves;
//! the dispatch engine owns all timing and cancellation.
//!
//! # Lifecycle
//! 1. The registry calls `service()`, `actions()` and `reactions()` at startup
//! 2. A user connects the service through the OAuth flow (`exchange_code`,
//!    `fetch_identity`)
//! 3. The engine polls `action_handler(name)` every tick with the Area's cursor
//! 4. On an event, the engine calls `reaction_handler(name)`
//!
//! # Example
//! ```no_run
//! use area::store::{ActionDescriptor, ReactionDescriptor, ServiceDescriptor};
//! use area_engine::adapter::{ActionPoller, ReactionInvoker, ServiceAdapter};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ServiceAdapter for Echo {
//!     fn service(&self) -> ServiceDescriptor {
//!         ServiceDescriptor {
//!             name: "echo".to_string(),
//!             description: "Echoes events".to_string(),
//!             oauth: false,
//!             color: "#000000".to_string(),
//!             icon: "echo".to_string(),
//!         }
//!     }
//!     fn actions(&self) -> Vec<ActionDescriptor> { vec![] }
//!     fn reactions(&self) -> Vec<ReactionDescriptor> { vec![] }
//!     fn action_handler(&self, _: &str) -> Option<Arc<dyn ActionPoller>> { None }
//!     fn reaction_handler(&self, _: &str) -> Option<Arc<dyn ReactionInvoker>> { None }
//! }
//! ```

use crate::oauth::exchange::{self, ClientAuth};
use area::config::OAuthClient;
use area::credentials::Credentials;
use area::store::{ActionDescriptor, ReactionDescriptor, ServiceDescriptor};
use area::{AreaError, Cursor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// OAuth 2.0 endpoints and default scopes of a provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

/// The external account behind a credential.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
}

/// Failure reported by an adapter. Never a panic.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Network failure or 5xx; retried next tick.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The provider refuses the credential (HTTP 401, revoked token, ...).
    #[error("credentials rejected: {0}")]
    Unauthorized(String),

    /// Any other refusal (4xx, malformed token response, ...).
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("adapter not configured: {0}")]
    Configuration(String),
}

impl AdapterError {
    /// Wraps the failure into the platform taxonomy, prefixed with what was
    /// being attempted.
    pub fn context(self, what: &str) -> AreaError {
        match self {
            AdapterError::Transient(msg) => {
                AreaError::TransientUpstream(format!("{} because {}", what, msg))
            }
            AdapterError::Unauthorized(msg) | AdapterError::Rejected(msg) => {
                AreaError::UpstreamAuth(format!("{} because {}", what, msg))
            }
            AdapterError::InvalidOptions(msg) => {
                AreaError::Validation(format!("{} because {}", what, msg))
            }
            AdapterError::Configuration(msg) => {
                AreaError::Configuration(format!("{} because {}", what, msg))
            }
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AdapterError::Rejected(format!("unexpected response body: {}", e))
        } else {
            AdapterError::Transient(e.to_string())
        }
    }
}

/// Input of one Action poll.
#[derive(Clone, Debug)]
pub struct PollRequest {
    /// The Area's cursor as persisted after the previous poll.
    pub cursor: Cursor,
    pub options: Value,
    /// `None` for services that do not use OAuth.
    pub credentials: Option<Credentials>,
}

/// What a poll observed.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// Nothing new. A `Some` cursor is persisted without firing (used to
    /// initialise state on the first poll).
    NoEvent { cursor: Option<Cursor> },
    /// Exactly one new event. The cursor must mark it as consumed.
    Event { payload: Value, cursor: Cursor },
}

impl PollOutcome {
    pub fn idle() -> Self {
        PollOutcome::NoEvent { cursor: None }
    }
}

/// Input of one Reaction invocation.
#[derive(Clone, Debug)]
pub struct ReactionRequest {
    pub options: Value,
    /// Payload of the event that triggered the Reaction.
    pub event: Value,
    pub credentials: Option<Credentials>,
}

#[async_trait]
pub trait ActionPoller: Send + Sync {
    async fn poll(&self, request: PollRequest) -> Result<PollOutcome, AdapterError>;
}

#[async_trait]
pub trait ReactionInvoker: Send + Sync {
    /// Returns a human-readable result stored as the Area's result row.
    async fn invoke(&self, request: ReactionRequest) -> Result<String, AdapterError>;
}

#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn service(&self) -> ServiceDescriptor;

    fn actions(&self) -> Vec<ActionDescriptor>;

    fn reactions(&self) -> Vec<ReactionDescriptor>;

    fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionPoller>>;

    fn reaction_handler(&self, name: &str) -> Option<Arc<dyn ReactionInvoker>>;

    /// `None` for services that need no user authorization.
    fn oauth_config(&self) -> Option<OAuthConfig> {
        None
    }

    /// Trades an authorization code for a token pair.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client: &OAuthClient,
    ) -> Result<Credentials, AdapterError> {
        let config = self.oauth_config().ok_or_else(|| {
            AdapterError::Configuration(format!("{} does not use OAuth", self.service().name))
        })?;
        exchange::exchange_code_for_token(
            &config.token_url,
            code,
            redirect_uri,
            client,
            ClientAuth::RequestBody,
        )
        .await
    }

    /// Obtains a new access token. The returned refresh token is `None` when
    /// the provider did not rotate it.
    async fn refresh_token(
        &self,
        refresh_token: &str,
        client: &OAuthClient,
    ) -> Result<Credentials, AdapterError> {
        let config = self.oauth_config().ok_or_else(|| {
            AdapterError::Configuration(format!("{} does not use OAuth", self.service().name))
        })?;
        exchange::refresh_access_token(
            &config.token_url,
            refresh_token,
            client,
            ClientAuth::RequestBody,
        )
        .await
    }

    async fn fetch_identity(&self, _credentials: &Credentials) -> Result<Identity, AdapterError> {
        Err(AdapterError::Configuration(format!(
            "{} has no user identity",
            self.service().name
        )))
    }
}

/// Decodes an Area's option payload into the handler's typed options.
pub fn parse_options<T: serde::de::DeserializeOwned>(options: &Value) -> Result<T, AdapterError> {
    serde_json::from_value(options.clone()).map_err(|e| AdapterError::InvalidOptions(e.to_string()))
}

/// Credentials of an OAuth-backed handler call.
pub fn require_credentials(credentials: &Option<Credentials>) -> Result<&Credentials, AdapterError> {
    credentials
        .as_ref()
        .ok_or_else(|| AdapterError::Unauthorized("no credential supplied".to_string()))
}
