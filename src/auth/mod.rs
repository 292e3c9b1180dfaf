use crate::session::SessionIssuer;
use crate::AreaError;
use axum::http::HeaderMap;


/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Resolves the calling user from the Authorization header.
pub fn authenticate(headers: &HeaderMap, sessions: &dyn SessionIssuer) -> Result<i64, AreaError> {
    let token =
        extract_bearer_token(headers).map_err(|e| AreaError::Unauthorized(e.to_string()))?;
    sessions.verify(&token)
}

/// Like [`authenticate`], but a missing header yields `Ok(None)`.
///
/// A header that is present but invalid is still an error.
pub fn authenticate_optional(
    headers: &HeaderMap,
    sessions: &dyn SessionIssuer,
) -> Result<Option<i64>, AreaError> {
    match extract_bearer_token(headers) {
        Ok(token) => sessions.verify(&token).map(Some),
        Err(TokenError::Missing) => Ok(None),
        Err(e) => Err(AreaError::Unauthorized(e.to_string())),
    }
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>"
    InvalidFormat,
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
