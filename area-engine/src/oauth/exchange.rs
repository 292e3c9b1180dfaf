//! OAuth token endpoint calls.
//!
//! Exchanges authorization codes and refresh tokens for access tokens.

use crate::adapter::AdapterError;
use crate::adapters::http::check_status;
use area::config::OAuthClient;
use area::credentials::Credentials;
use serde::Deserialize;
use std::collections::HashMap;

/// How the client authenticates against the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientAuth {
    /// `client_id` / `client_secret` form fields
    RequestBody,
    /// HTTP basic authentication header
    Basic,
}

/// OAuth token response (standard OAuth 2.0)
///
/// Some providers answer 200 with an `error` field instead of a token.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchange authorization code for access token
pub async fn exchange_code_for_token(
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    client: &OAuthClient,
    auth: ClientAuth,
) -> Result<Credentials, AdapterError> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", redirect_uri);

    tracing::debug!(token_url = %token_url, "Exchanging authorization code for token");
    post_token_form(token_url, form, client, auth).await
}

/// Refresh an access token (`grant_type=refresh_token`).
pub async fn refresh_access_token(
    token_url: &str,
    refresh_token: &str,
    client: &OAuthClient,
    auth: ClientAuth,
) -> Result<Credentials, AdapterError> {
    let mut form = HashMap::new();
    form.insert("grant_type", "refresh_token");
    form.insert("refresh_token", refresh_token);

    tracing::debug!(token_url = %token_url, "Refreshing access token");
    post_token_form(token_url, form, client, auth).await
}

async fn post_token_form<'a>(
    token_url: &str,
    mut form: HashMap<&'a str, &'a str>,
    client: &'a OAuthClient,
    auth: ClientAuth,
) -> Result<Credentials, AdapterError> {
    let http = reqwest::Client::new();
    let mut request = http.post(token_url).header("Accept", "application/json");

    match auth {
        ClientAuth::RequestBody => {
            form.insert("client_id", &client.client_id);
            if let Some(secret) = client.client_secret.as_deref() {
                form.insert("client_secret", secret);
            }
        }
        ClientAuth::Basic => {
            request = request.basic_auth(&client.client_id, client.client_secret.as_deref());
        }
    }

    let response = check_status(request.form(&form).send().await?).await?;
    let token: TokenResponse = response.json().await?;

    if let Some(error) = token.error {
        let description = token.error_description.unwrap_or_default();
        return Err(AdapterError::Rejected(format!("{} {}", error, description).trim().to_string()));
    }

    let access_token = token
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AdapterError::Rejected("no access token in response".to_string()))?;

    tracing::debug!(
        has_refresh_token = token.refresh_token.is_some(),
        expires_in = ?token.expires_in,
        "Token endpoint call successful"
    );

    let expires_at = token
        .expires_in
        .map(|secs| {
            Credentials::expiry_in(secs).ok_or_else(|| {
                AdapterError::Rejected(format!("expires_in out of range: {}", secs))
            })
        })
        .transpose()?;

    Ok(Credentials {
        access_token,
        refresh_token: token.refresh_token,
        expires_at,
    })
}
