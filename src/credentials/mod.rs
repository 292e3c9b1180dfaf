//! Encrypted credential storage for OAuth tokens.
//!
//! One row per (user, service) pair. Access and refresh tokens are sealed
//! with AES-256-GCM before they reach SQLite.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - find / save / delete by (user, svc)   │
//! │  - transparent seal/open                 │
//! └─────────────────────────────────────────┘
//!          ↓ (seal)             ↑ (open)
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher (AES-256-GCM)          │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite `credentials` table         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use area::credentials::{CredentialStore, Credentials};
//! use chrono::{Duration, Utc};
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = std::env::var("AREA_ENCRYPTION_KEY")?;
//! let store = CredentialStore::new("area.db", &key)?;
//!
//! let creds = Credentials {
//!     access_token: "gho_access".to_string(),
//!     refresh_token: Some("ghr_refresh".to_string()),
//!     expires_at: Some(Utc::now() + Duration::hours(1)),
//! };
//! store.save(42, "github", &creds)?;
//!
//! if let Some(creds) = store.find_by_user_and_service(42, "github")? {
//!     println!("expires at {:?}", creds.expires_at);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::TokenCipher;
pub use storage::CredentialStore;

/// OAuth token pair for one (user, service).
///
/// Never serialized into API responses; only adapters see the raw tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Absolute expiry for a provider's `expires_in`. `None` when the value
    /// is negative or too large to land on a representable instant.
    pub fn expiry_in(secs: i64) -> Option<DateTime<Utc>> {
        if secs < 0 {
            return None;
        }
        Duration::try_seconds(secs).and_then(|d| Utc::now().checked_add_signed(d))
    }

    /// True when the token expires within `threshold` (or already has) and
    /// can be renewed. Tokens without expiry or without a refresh token are
    /// used as-is.
    pub fn needs_refresh(&self, threshold: Duration) -> bool {
        match (&self.expires_at, &self.refresh_token) {
            (Some(expires_at), Some(_)) => Utc::now()
                .checked_add_signed(threshold)
                .map_or(true, |limit| *expires_at <= limit),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_expiry(expires_in: Option<Duration>, refresh: bool) -> Credentials {
        Credentials {
            access_token: "tok".to_string(),
            refresh_token: refresh.then(|| "r".to_string()),
            expires_at: expires_in.map(|d| Utc::now() + d),
        }
    }

    #[test]
    fn test_needs_refresh_no_refresh_token() {
        let c = with_expiry(Some(Duration::seconds(30)), false);
        assert!(!c.needs_refresh(Duration::seconds(90)));
    }

    #[test]
    fn test_needs_refresh_no_expiry() {
        let c = with_expiry(None, true);
        assert!(!c.needs_refresh(Duration::seconds(90)));
    }

    #[test]
    fn test_needs_refresh_far_future() {
        let c = with_expiry(Some(Duration::hours(2)), true);
        assert!(!c.needs_refresh(Duration::seconds(90)));
    }

    #[test]
    fn test_needs_refresh_near_or_past_expiry() {
        assert!(with_expiry(Some(Duration::seconds(30)), true).needs_refresh(Duration::seconds(90)));
        assert!(with_expiry(Some(Duration::seconds(-1)), true).needs_refresh(Duration::seconds(90)));
    }

    #[test]
    fn test_expiry_in_bounds() {
        let soon = Credentials::expiry_in(3600).unwrap();
        assert!(soon > Utc::now() + Duration::minutes(59));
        assert!(Credentials::expiry_in(0).is_some());

        assert!(Credentials::expiry_in(-5).is_none());
        assert!(Credentials::expiry_in(i64::MAX).is_none());
        assert!(Credentials::expiry_in(i64::MAX / 1000).is_none());
    }
}
