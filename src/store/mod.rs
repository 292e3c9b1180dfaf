//! Relational store of record.
//!
//! One SQLite-backed store per aggregate, each owning its own connection
//! behind a `Mutex`. Writes for a row are serialized by SQLite itself; the
//! engine adds no locking of its own.

mod areas;
mod catalog;
mod results;
mod users;

pub use areas::{Area, AreaSettings, AreaStore, NewArea};
pub use catalog::{
    Action, ActionDescriptor, CatalogStore, Reaction, ReactionDescriptor, Service,
    ServiceDescriptor,
};
pub use results::{AreaResult, AreaResultStore};
pub use users::{NewUser, User, UserStore};

use crate::credentials::CredentialStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Every store the platform needs, opened on one database file.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<UserStore>,
    pub credentials: Arc<CredentialStore>,
    pub catalog: Arc<CatalogStore>,
    pub areas: Arc<AreaStore>,
    pub results: Arc<AreaResultStore>,
}

impl Stores {
    pub fn open(db_path: &str, encryption_key: &str) -> Result<Self> {
        tracing::debug!(db_path = %db_path, "Opening stores");
        Ok(Self {
            users: Arc::new(UserStore::new(db_path)?),
            credentials: Arc::new(CredentialStore::new(db_path, encryption_key)?),
            catalog: Arc::new(CatalogStore::new(db_path)?),
            areas: Arc::new(AreaStore::new(db_path)?),
            results: Arc::new(AreaResultStore::new(db_path)?),
        })
    }
}

pub(crate) fn open_connection(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    // Several stores share the file; wait on each other's writes instead of failing.
    conn.busy_timeout(Duration::from_secs(5))
        .context("Failed to set busy timeout")?;
    Ok(conn)
}

pub(crate) fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection mutex poisoned"))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse timestamp '{}'", raw))
}
