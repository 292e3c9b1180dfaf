//! Encrypted credential storage using SQLite.

use super::{Credentials, TokenCipher};
use crate::store::{lock, open_connection};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id INTEGER PRIMARY KEY,
///     user_id INTEGER NOT NULL,
///     service TEXT NOT NULL,
///     access_token TEXT NOT NULL,       -- sealed
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,               -- sealed (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT,                  -- RFC 3339 (optional)
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(user_id, service)
/// );
/// ```
///
/// The UNIQUE constraint makes "at most one live credential per (user,
/// service)" a storage invariant; `save` is an upsert.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`":memory:"` in tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new(db_path: &str, encryption_key: &str) -> Result<Self> {
        let cipher =
            TokenCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;
        let conn = open_connection(db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                service TEXT NOT NULL,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, service)
            );
            CREATE INDEX IF NOT EXISTS idx_credentials_user_service
                ON credentials(user_id, service);
            "#,
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    /// Stores credentials for a user and service, replacing any previous pair.
    pub fn save(&self, user_id: i64, service: &str, credentials: &Credentials) -> Result<()> {
        let (access_token, access_token_nonce) = self
            .cipher
            .seal(&credentials.access_token)
            .context("Failed to encrypt access token")?;

        let (refresh_token, refresh_token_nonce) = match &credentials.refresh_token {
            Some(token) => {
                let (sealed, nonce) = self
                    .cipher
                    .seal(token)
                    .context("Failed to encrypt refresh token")?;
                (Some(sealed), Some(nonce))
            }
            None => (None, None),
        };

        let expires_at = credentials.expires_at.map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        lock(&self.conn)?
            .execute(
                r#"
                INSERT INTO credentials (
                    user_id, service,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(user_id, service) DO UPDATE SET
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id,
                    service,
                    access_token,
                    access_token_nonce,
                    refresh_token,
                    refresh_token_nonce,
                    expires_at,
                    now,
                    now,
                ],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    /// Alias for [`save`](Self::save); storage is upsert.
    pub fn update(&self, user_id: i64, service: &str, credentials: &Credentials) -> Result<()> {
        self.save(user_id, service, credentials)
    }

    /// Retrieves and decrypts the credentials of a user for a service.
    pub fn find_by_user_and_service(
        &self,
        user_id: i64,
        service: &str,
    ) -> Result<Option<Credentials>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at
                FROM credentials
                WHERE user_id = ?1 AND service = ?2
                "#,
            )
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![user_id, service])
            .context("Failed to execute query")?;

        let Some(row) = rows.next().context("Failed to read row")? else {
            return Ok(None);
        };

        let access_token: String = row.get(0)?;
        let access_token_nonce: String = row.get(1)?;
        let access_token = self
            .cipher
            .open(&access_token, &access_token_nonce)
            .context("Failed to decrypt access token")?;

        let refresh_token: Option<String> = row.get(2)?;
        let refresh_token_nonce: Option<String> = row.get(3)?;
        let refresh_token = match (refresh_token, refresh_token_nonce) {
            (Some(sealed), Some(nonce)) => Some(
                self.cipher
                    .open(&sealed, &nonce)
                    .context("Failed to decrypt refresh token")?,
            ),
            _ => None,
        };

        let expires_at: Option<String> = row.get(4)?;
        let expires_at = expires_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .context("Failed to parse expires_at timestamp")?;

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Deletes the credentials of a user for a service.
    ///
    /// Returns `Ok(false)` when nothing was stored.
    pub fn delete(&self, user_id: i64, service: &str) -> Result<bool> {
        let rows_affected = lock(&self.conn)?
            .execute(
                "DELETE FROM credentials WHERE user_id = ?1 AND service = ?2",
                params![user_id, service],
            )
            .context("Failed to delete credentials")?;

        Ok(rows_affected > 0)
    }

    /// Services a user has connected, sorted by name.
    pub fn list_by_user(&self, user_id: i64) -> Result<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT service FROM credentials WHERE user_id = ?1 ORDER BY service")
            .context("Failed to prepare query")?;

        let services = stmt
            .query_map(params![user_id], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(services)
    }
}
