//! Reference data: Services and the Actions/Reactions they offer.
//!
//! Rows are seeded at startup from the registered adapters. Every write is
//! insert-if-absent keyed by name, so re-seeding on restart is a no-op and
//! ids stay stable across restarts.

use super::{lock, open_connection};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// Static metadata an adapter publishes about its provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub description: String,
    /// Whether a user must connect an OAuth credential before using it.
    pub oauth: bool,
    pub color: String,
    pub icon: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    /// Option payload shown to the user as a template.
    pub default_options: Value,
    /// Smallest safe polling interval against the provider.
    pub minimum_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReactionDescriptor {
    pub name: String,
    pub description: String,
    pub default_options: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub oauth: bool,
    pub color: String,
    pub icon: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub description: String,
    pub default_options: Value,
    pub minimum_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reaction {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub description: String,
    pub default_options: Value,
}

pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = open_connection(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS services (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                oauth       INTEGER NOT NULL,
                color       TEXT NOT NULL,
                icon        TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS actions (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                service_id            INTEGER NOT NULL,
                name                  TEXT NOT NULL,
                description           TEXT NOT NULL,
                default_options       TEXT NOT NULL,
                minimum_interval_secs INTEGER NOT NULL,
                UNIQUE(service_id, name)
            );
            CREATE TABLE IF NOT EXISTS reactions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                service_id      INTEGER NOT NULL,
                name            TEXT NOT NULL,
                description     TEXT NOT NULL,
                default_options TEXT NOT NULL,
                UNIQUE(service_id, name)
            );",
        )
        .context("Failed to create catalog tables")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- services ---

    pub fn save_service_if_absent(&self, descriptor: &ServiceDescriptor) -> Result<Service> {
        {
            let conn = lock(&self.conn)?;
            conn.execute(
                "INSERT OR IGNORE INTO services (name, description, oauth, color, icon)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    descriptor.name,
                    descriptor.description,
                    descriptor.oauth,
                    descriptor.color,
                    descriptor.icon
                ],
            )
            .with_context(|| format!("Failed to seed service {}", descriptor.name))?;
        }
        self.service_by_name(&descriptor.name)?
            .with_context(|| format!("Service {} missing after seeding", descriptor.name))
    }

    pub fn service_by_name(&self, name: &str) -> Result<Option<Service>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            "SELECT id, name, description, oauth, color, icon FROM services WHERE name = ?1",
            params![name],
            row_to_service,
        )
        .optional()
        .context("Failed to query services")
    }

    pub fn service_by_id(&self, id: i64) -> Result<Option<Service>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            "SELECT id, name, description, oauth, color, icon FROM services WHERE id = ?1",
            params![id],
            row_to_service,
        )
        .optional()
        .context("Failed to query services")
    }

    pub fn list_services(&self) -> Result<Vec<Service>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT id, name, description, oauth, color, icon FROM services ORDER BY name")
            .context("Failed to prepare query")?;
        let services = stmt
            .query_map([], row_to_service)
            .context("Failed to execute query")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list services")?;
        Ok(services)
    }

    // --- actions ---

    pub fn save_action_if_absent(
        &self,
        service_id: i64,
        descriptor: &ActionDescriptor,
    ) -> Result<Action> {
        {
            let conn = lock(&self.conn)?;
            conn.execute(
                "INSERT OR IGNORE INTO actions
                    (service_id, name, description, default_options, minimum_interval_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    service_id,
                    descriptor.name,
                    descriptor.description,
                    descriptor.default_options.to_string(),
                    descriptor.minimum_interval_secs as i64
                ],
            )
            .with_context(|| format!("Failed to seed action {}", descriptor.name))?;
        }
        self.action_by_name(&descriptor.name)?
            .with_context(|| format!("Action {} missing after seeding", descriptor.name))
    }

    pub fn action_by_name(&self, name: &str) -> Result<Option<Action>> {
        self.find_action("WHERE name = ?1 ORDER BY id LIMIT 1", name)
    }

    pub fn action_by_id(&self, id: i64) -> Result<Option<Action>> {
        self.find_action("WHERE id = ?1", id)
    }

    pub fn actions_for_service(&self, service_id: i64) -> Result<Vec<Action>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, service_id, name, description, default_options, minimum_interval_secs
                 FROM actions WHERE service_id = ?1 ORDER BY name",
            )
            .context("Failed to prepare query")?;
        let mut rows = stmt.query(params![service_id])?;
        let mut actions = Vec::new();
        while let Some(row) = rows.next()? {
            actions.push(row_to_action(row)?);
        }
        Ok(actions)
    }

    fn find_action<P: rusqlite::ToSql>(&self, filter: &str, param: P) -> Result<Option<Action>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, service_id, name, description, default_options, minimum_interval_secs
                 FROM actions {}",
                filter
            ))
            .context("Failed to prepare query")?;
        let mut rows = stmt.query(params![param])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_action(row)?)),
            None => Ok(None),
        }
    }

    // --- reactions ---

    pub fn save_reaction_if_absent(
        &self,
        service_id: i64,
        descriptor: &ReactionDescriptor,
    ) -> Result<Reaction> {
        {
            let conn = lock(&self.conn)?;
            conn.execute(
                "INSERT OR IGNORE INTO reactions (service_id, name, description, default_options)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    service_id,
                    descriptor.name,
                    descriptor.description,
                    descriptor.default_options.to_string()
                ],
            )
            .with_context(|| format!("Failed to seed reaction {}", descriptor.name))?;
        }
        self.reaction_by_name(&descriptor.name)?
            .with_context(|| format!("Reaction {} missing after seeding", descriptor.name))
    }

    pub fn reaction_by_name(&self, name: &str) -> Result<Option<Reaction>> {
        self.find_reaction("WHERE name = ?1 ORDER BY id LIMIT 1", name)
    }

    pub fn reaction_by_id(&self, id: i64) -> Result<Option<Reaction>> {
        self.find_reaction("WHERE id = ?1", id)
    }

    pub fn reactions_for_service(&self, service_id: i64) -> Result<Vec<Reaction>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, service_id, name, description, default_options
                 FROM reactions WHERE service_id = ?1 ORDER BY name",
            )
            .context("Failed to prepare query")?;
        let mut rows = stmt.query(params![service_id])?;
        let mut reactions = Vec::new();
        while let Some(row) = rows.next()? {
            reactions.push(row_to_reaction(row)?);
        }
        Ok(reactions)
    }

    fn find_reaction<P: rusqlite::ToSql>(
        &self,
        filter: &str,
        param: P,
    ) -> Result<Option<Reaction>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, service_id, name, description, default_options FROM reactions {}",
                filter
            ))
            .context("Failed to prepare query")?;
        let mut rows = stmt.query(params![param])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_reaction(row)?)),
            None => Ok(None),
        }
    }
}

fn row_to_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        oauth: row.get(3)?,
        color: row.get(4)?,
        icon: row.get(5)?,
    })
}

fn row_to_action(row: &rusqlite::Row<'_>) -> Result<Action> {
    let default_options: String = row.get(4)?;
    let minimum_interval_secs: i64 = row.get(5)?;
    Ok(Action {
        id: row.get(0)?,
        service_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        default_options: serde_json::from_str(&default_options)
            .context("Failed to parse action default_options")?,
        minimum_interval_secs: minimum_interval_secs.max(0) as u64,
    })
}

fn row_to_reaction(row: &rusqlite::Row<'_>) -> Result<Reaction> {
    let default_options: String = row.get(4)?;
    Ok(Reaction {
        id: row.get(0)?,
        service_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        default_options: serde_json::from_str(&default_options)
            .context("Failed to parse reaction default_options")?,
    })
}
