//! Per-provider OAuth client credentials.
//!
//! Adapters are configured per environment, so a missing client id is an
//! error of the operation that needs it, not of process start.

use crate::error::AreaError;

/// OAuth client registered with a provider
#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub client_id: String,
    /// Absent for public clients (authorization URL only needs the id)
    pub client_secret: Option<String>,
}

impl OAuthClient {
    /// Reads `AREA_OAUTH_<SERVICE>_CLIENT_ID` / `_CLIENT_SECRET`.
    pub fn from_env(service: &str) -> Result<Self, AreaError> {
        let prefix = env_prefix(service);
        let id_var = format!("AREA_OAUTH_{}_CLIENT_ID", prefix);
        let client_id = std::env::var(&id_var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AreaError::Configuration(format!(
                    "OAuth not configured for service '{}': set {}",
                    service, id_var
                ))
            })?;
        let client_secret = std::env::var(format!("AREA_OAUTH_{}_CLIENT_SECRET", prefix))
            .ok()
            .filter(|v| !v.is_empty());

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Like [`from_env`](Self::from_env) but also requires the secret.
    pub fn confidential_from_env(service: &str) -> Result<Self, AreaError> {
        let client = Self::from_env(service)?;
        if client.client_secret.is_none() {
            return Err(AreaError::Configuration(format!(
                "OAuth not configured for service '{}': set AREA_OAUTH_{}_CLIENT_SECRET",
                service,
                env_prefix(service)
            )));
        }
        Ok(client)
    }

    pub fn secret(&self) -> &str {
        self.client_secret.as_deref().unwrap_or_default()
    }
}

fn env_prefix(service: &str) -> String {
    service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("github"), "GITHUB");
        assert_eq!(env_prefix("google-calendar"), "GOOGLE_CALENDAR");
    }

    #[test]
    fn test_missing_client_id_is_configuration_error() {
        let err = OAuthClient::from_env("nonexistentprovider").unwrap_err();
        assert!(matches!(err, AreaError::Configuration(_)));
        assert!(err.to_string().contains("AREA_OAUTH_NONEXISTENTPROVIDER_CLIENT_ID"));
    }

    #[test]
    fn test_reads_client_from_env() {
        std::env::set_var("AREA_OAUTH_CONFIGTESTPROVIDER_CLIENT_ID", "id-123");
        std::env::set_var("AREA_OAUTH_CONFIGTESTPROVIDER_CLIENT_SECRET", "secret-456");

        let client = OAuthClient::confidential_from_env("configtestprovider").unwrap();
        assert_eq!(client.client_id, "id-123");
        assert_eq!(client.secret(), "secret-456");
    }
}
