//! OAuth client lookup and authorization URLs.

use crate::adapter::OAuthConfig;
use area::config::OAuthClient;
use area::AreaError;
use std::collections::HashMap;

/// Where provider client credentials come from.
///
/// Looked up at operation time: a provider without credentials only breaks
/// the operations that need them.
pub trait ClientSource: Send + Sync {
    fn client(&self, service: &str) -> Result<OAuthClient, AreaError>;
}

/// Reads `AREA_OAUTH_<SERVICE>_CLIENT_ID` / `_CLIENT_SECRET`.
pub struct EnvClients;

impl ClientSource for EnvClients {
    fn client(&self, service: &str) -> Result<OAuthClient, AreaError> {
        OAuthClient::from_env(service)
    }
}

/// Fixed client table.
#[derive(Default)]
pub struct StaticClients {
    clients: HashMap<String, OAuthClient>,
}

impl StaticClients {
    pub fn with(mut self, service: &str, client_id: &str, client_secret: &str) -> Self {
        self.clients.insert(
            service.to_string(),
            OAuthClient {
                client_id: client_id.to_string(),
                client_secret: Some(client_secret.to_string()),
            },
        );
        self
    }
}

impl ClientSource for StaticClients {
    fn client(&self, service: &str) -> Result<OAuthClient, AreaError> {
        self.clients.get(service).cloned().ok_or_else(|| {
            AreaError::Configuration(format!("OAuth not configured for service '{}'", service))
        })
    }
}

/// Build authorization URL with state and redirect_uri.
///
/// `scope` replaces the provider's default scopes when given.
pub fn build_auth_url(
    config: &OAuthConfig,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    scope: Option<&str>,
) -> String {
    let scopes = match scope {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => config.scopes.join(" "),
    };
    format!(
        "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code",
        config.auth_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes),
        urlencoding::encode(state)
    )
}
