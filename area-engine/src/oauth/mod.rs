//! Token lifecycle: the three-legged OAuth flow and credential freshness.
//!
//! 1. `build_authorization_url` → user authorizes on the provider's site
//! 2. Provider redirects to `/api/services/:service/oauth/callback`
//! 3. `complete_callback` (state check + code exchange): code → token pair →
//!    provider identity → local user → stored credential → session token
//!
//! Mobile clients that already hold a token pair skip steps 1-2 through
//! `exchange_mobile_token`; the pair is still checked against the
//! provider's identity endpoint before it is trusted.

pub mod exchange;
pub mod provider;
mod state_manager;

pub use provider::{ClientSource, EnvClients, StaticClients};
pub use state_manager::{run_state_cleanup, StateEntry, StateManager};

use crate::adapter::ServiceAdapter;
use crate::registry::ServiceRegistry;
use area::credentials::{CredentialStore, Credentials};
use area::session::SessionIssuer;
use area::store::{NewUser, User, UserStore};
use area::AreaError;
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token pair obtained by a mobile client through the provider's own SDK.
#[derive(Clone, Debug, Deserialize)]
pub struct MobileToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<i64>,
}

pub struct TokenLifecycle {
    registry: Arc<ServiceRegistry>,
    users: Arc<UserStore>,
    credentials: Arc<CredentialStore>,
    sessions: Arc<dyn SessionIssuer>,
    clients: Arc<dyn ClientSource>,
    states: StateManager,
    callback_base_url: String,
    refresh_threshold: Duration,
}

impl TokenLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        users: Arc<UserStore>,
        credentials: Arc<CredentialStore>,
        sessions: Arc<dyn SessionIssuer>,
        clients: Arc<dyn ClientSource>,
        states: StateManager,
        callback_base_url: &str,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            registry,
            users,
            credentials,
            sessions,
            clients,
            states,
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
            refresh_threshold,
        }
    }

    pub fn states(&self) -> &StateManager {
        &self.states
    }

    pub fn redirect_uri(&self, service: &str) -> String {
        format!(
            "{}/api/services/{}/oauth/callback",
            self.callback_base_url, service
        )
    }

    /// Provider authorization URL carrying a fresh CSRF state.
    pub fn build_authorization_url(
        &self,
        service: &str,
        scope: Option<&str>,
        caller: Option<i64>,
    ) -> Result<String, AreaError> {
        let adapter = self.registry.adapter(service)?;
        let config = oauth_config(adapter.as_ref(), service)?;
        let client = self.clients.client(service)?;

        let state = self.states.create_state(service, caller);
        let url = provider::build_auth_url(
            &config,
            &client.client_id,
            &self.redirect_uri(service),
            &state,
            scope,
        );

        debug!(service = %service, "Built authorization URL");
        Ok(url)
    }

    /// Checks the callback's state parameter and returns who started the flow.
    pub fn consume_state(&self, service: &str, state: &str) -> Result<StateEntry, AreaError> {
        let entry = self.states.validate_and_consume(state).ok_or_else(|| {
            AreaError::Validation("unknown or expired OAuth state".to_string())
        })?;
        if entry.service != service {
            warn!(service = %service, expected = %entry.service, "OAuth state issued for another service");
            return Err(AreaError::Validation(
                "OAuth state does not match service".to_string(),
            ));
        }
        Ok(entry)
    }

    /// Exchanges an authorization code and signs the caller in.
    ///
    /// With a valid `caller_token` the credential is linked to that user;
    /// otherwise the provider identity logs in (or registers) a user by email.
    pub async fn exchange_authorization_code(
        &self,
        service: &str,
        code: &str,
        caller_token: Option<&str>,
    ) -> Result<String, AreaError> {
        if code.trim().is_empty() {
            return Err(AreaError::Validation("missing authentication code".to_string()));
        }
        let caller = caller_token
            .map(|token| self.sessions.verify(token))
            .transpose()?;
        self.exchange_authorization_code_for(service, code, caller).await
    }

    /// Provider redirect: checks the code, consumes the state, then signs in
    /// whoever started the flow.
    pub async fn complete_callback(
        &self,
        service: &str,
        code: &str,
        state: &str,
    ) -> Result<String, AreaError> {
        if code.trim().is_empty() {
            return Err(AreaError::Validation("missing authentication code".to_string()));
        }
        let entry = self.consume_state(service, state)?;
        self.exchange_authorization_code_for(service, code, entry.user_id)
            .await
    }

    /// Same as [`exchange_authorization_code`](Self::exchange_authorization_code)
    /// with the caller already resolved (e.g. from the OAuth state).
    pub async fn exchange_authorization_code_for(
        &self,
        service: &str,
        code: &str,
        caller: Option<i64>,
    ) -> Result<String, AreaError> {
        if code.trim().is_empty() {
            return Err(AreaError::Validation("missing authentication code".to_string()));
        }

        let adapter = self.registry.adapter(service)?;
        oauth_config(adapter.as_ref(), service)?;
        let client = self.clients.client(service)?;

        let credentials = adapter
            .exchange_code(code, &self.redirect_uri(service), &client)
            .await
            .map_err(|e| e.context("unable to exchange authorization code"))?;

        self.sign_in(adapter.as_ref(), service, credentials, caller)
            .await
    }

    /// Accepts a token pair the caller already holds.
    pub async fn exchange_mobile_token(
        &self,
        service: &str,
        token: MobileToken,
        caller_token: Option<&str>,
    ) -> Result<String, AreaError> {
        if token.access_token.trim().is_empty() {
            return Err(AreaError::Validation("missing access token".to_string()));
        }
        let caller = caller_token
            .map(|t| self.sessions.verify(t))
            .transpose()?;

        let adapter = self.registry.adapter(service)?;
        oauth_config(adapter.as_ref(), service)?;

        let expires_at = token
            .expires_in
            .map(|secs| {
                Credentials::expiry_in(secs).ok_or_else(|| {
                    AreaError::Validation(format!("expires_in out of range: {}", secs))
                })
            })
            .transpose()?;

        let credentials = Credentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        };
        self.sign_in(adapter.as_ref(), service, credentials, caller)
            .await
    }

    async fn sign_in(
        &self,
        adapter: &dyn ServiceAdapter,
        service: &str,
        credentials: Credentials,
        caller: Option<i64>,
    ) -> Result<String, AreaError> {
        let identity = adapter
            .fetch_identity(&credentials)
            .await
            .map_err(|e| e.context("unable to get user info"))?;

        let user = match caller {
            Some(user_id) => self
                .users
                .find_by_id(user_id)?
                .ok_or_else(|| AreaError::NotFound(format!("user {}", user_id)))?,
            None => self.resolve_user(&identity.email, &identity.display_name)?,
        };

        self.credentials.save(user.id, service, &credentials)?;

        info!(
            user_id = user.id,
            service = %service,
            linked = caller.is_some(),
            "OAuth credential stored"
        );

        self.sessions.issue(user.id)
    }

    /// Finds the user owning `email`, creating an OAuth-only user if none.
    fn resolve_user(&self, email: &str, display_name: &str) -> Result<User, AreaError> {
        if email.trim().is_empty() {
            return Err(AreaError::UpstreamAuth(
                "unable to get user info because the provider returned no email".to_string(),
            ));
        }
        if let Some(user) = self.users.find_by_email(email)? {
            return Ok(user);
        }

        let username = if display_name.trim().is_empty() {
            email.split('@').next().unwrap_or(email).to_string()
        } else {
            display_name.to_string()
        };
        let user = self.users.save(&NewUser {
            username,
            email: email.to_string(),
            password_hash: None,
        })?;
        info!(user_id = user.id, "Registered OAuth-only user");
        Ok(user)
    }

    /// Stored credential, as is.
    pub fn get_credential(&self, user_id: i64, service: &str) -> Result<Credentials, AreaError> {
        self.credentials
            .find_by_user_and_service(user_id, service)?
            .ok_or_else(|| {
                AreaError::NotFound(format!("credential of user {} for {}", user_id, service))
            })
    }

    /// Stored credential, refreshed first when it expires within the
    /// configured threshold.
    pub async fn fresh_credential(
        &self,
        user_id: i64,
        service: &str,
    ) -> Result<Credentials, AreaError> {
        let current = self.get_credential(user_id, service)?;
        if !current.needs_refresh(self.refresh_threshold) {
            return Ok(current);
        }
        let Some(refresh_token) = current.refresh_token.clone() else {
            return Ok(current);
        };

        info!(user_id, service = %service, "Refreshing OAuth token");

        let adapter = self.registry.adapter(service)?;
        let client = self.clients.client(service)?;
        let renewed = adapter
            .refresh_token(&refresh_token, &client)
            .await
            .map_err(|e| {
                AreaError::UpstreamAuth(format!("token refresh for {} failed: {}", service, e))
            })?;

        // Keep the existing refresh token if the provider did not rotate it
        let credentials = Credentials {
            access_token: renewed.access_token,
            refresh_token: renewed.refresh_token.or(Some(refresh_token)),
            expires_at: renewed.expires_at,
        };
        self.credentials.update(user_id, service, &credentials)?;

        info!(user_id, service = %service, "OAuth token refreshed successfully");
        Ok(credentials)
    }

    /// Removes the user's credential for a service.
    pub fn disconnect(&self, user_id: i64, service: &str) -> Result<(), AreaError> {
        if !self.credentials.delete(user_id, service)? {
            return Err(AreaError::NotFound(format!(
                "connection of user {} to {}",
                user_id, service
            )));
        }
        info!(user_id, service = %service, "Service disconnected");
        Ok(())
    }

    /// Services the user holds a credential for.
    pub fn connected_services(&self, user_id: i64) -> Result<Vec<String>, AreaError> {
        Ok(self.credentials.list_by_user(user_id)?)
    }
}

fn oauth_config(
    adapter: &dyn ServiceAdapter,
    service: &str,
) -> Result<crate::adapter::OAuthConfig, AreaError> {
    adapter
        .oauth_config()
        .ok_or_else(|| AreaError::Validation(format!("service {} does not use OAuth", service)))
}
