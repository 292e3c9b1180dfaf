//! Area bindings.
//!
//! The user edits an Area's settings; the dispatch engine only ever writes
//! its cursor. The two writes touch disjoint columns so neither clobbers the
//! other.

use super::{lock, open_connection, parse_timestamp};
use crate::Cursor;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Area {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub action_id: i64,
    pub action_options: Value,
    /// User-chosen poll interval; 0 means "as often as the Action allows".
    pub action_interval_secs: u64,
    pub reaction_id: i64,
    pub reaction_options: Value,
    pub enabled: bool,
    pub cursor: Cursor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Area {
    pub fn settings(&self) -> AreaSettings {
        AreaSettings {
            title: self.title.clone(),
            description: self.description.clone(),
            action_options: self.action_options.clone(),
            action_interval_secs: self.action_interval_secs,
            reaction_options: self.reaction_options.clone(),
            enabled: self.enabled,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewArea {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub action_id: i64,
    #[serde(default = "empty_object")]
    pub action_options: Value,
    #[serde(default)]
    pub action_interval_secs: u64,
    pub reaction_id: i64,
    #[serde(default = "empty_object")]
    pub reaction_options: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// The user-editable part of an Area.
#[derive(Clone, Debug, PartialEq)]
pub struct AreaSettings {
    pub title: String,
    pub description: String,
    pub action_options: Value,
    pub action_interval_secs: u64,
    pub reaction_options: Value,
    pub enabled: bool,
}

pub struct AreaStore {
    conn: Mutex<Connection>,
}

const AREA_COLUMNS: &str = "id, user_id, title, description, action_id, action_options, \
     action_interval_secs, reaction_id, reaction_options, enabled, cursor, created_at, updated_at";

impl AreaStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = open_connection(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS areas (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id              INTEGER NOT NULL,
                title                TEXT NOT NULL,
                description          TEXT NOT NULL,
                action_id            INTEGER NOT NULL,
                action_options       TEXT NOT NULL,
                action_interval_secs INTEGER NOT NULL,
                reaction_id          INTEGER NOT NULL,
                reaction_options     TEXT NOT NULL,
                enabled              INTEGER NOT NULL DEFAULT 1,
                cursor               TEXT NOT NULL,
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_areas_user ON areas(user_id);
            CREATE INDEX IF NOT EXISTS idx_areas_enabled ON areas(enabled);",
        )
        .context("Failed to create areas table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts an enabled Area with an empty cursor.
    pub fn insert(&self, user_id: i64, area: &NewArea) -> Result<Area> {
        let now = Utc::now();
        let cursor = Cursor::default();
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO areas
                (user_id, title, description, action_id, action_options, action_interval_secs,
                 reaction_id, reaction_options, enabled, cursor, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?10)",
            params![
                user_id,
                area.title,
                area.description,
                area.action_id,
                area.action_options.to_string(),
                stored_interval(area.action_interval_secs)?,
                area.reaction_id,
                area.reaction_options.to_string(),
                cursor.to_json_string(),
                now.to_rfc3339(),
            ],
        )
        .context("Failed to insert area")?;

        Ok(Area {
            id: conn.last_insert_rowid(),
            user_id,
            title: area.title.clone(),
            description: area.description.clone(),
            action_id: area.action_id,
            action_options: area.action_options.clone(),
            action_interval_secs: area.action_interval_secs,
            reaction_id: area.reaction_id,
            reaction_options: area.reaction_options.clone(),
            enabled: true,
            cursor,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Area>> {
        let mut areas = self.query(&format!("SELECT {} FROM areas WHERE id = ?1", AREA_COLUMNS), id)?;
        Ok(areas.pop())
    }

    pub fn find_by_user(&self, user_id: i64) -> Result<Vec<Area>> {
        self.query(
            &format!("SELECT {} FROM areas WHERE user_id = ?1 ORDER BY id", AREA_COLUMNS),
            user_id,
        )
    }

    pub fn find_enabled(&self) -> Result<Vec<Area>> {
        self.query(
            &format!("SELECT {} FROM areas WHERE enabled = ?1 ORDER BY id", AREA_COLUMNS),
            true,
        )
    }

    /// Writes the user-editable columns. The cursor is left untouched.
    ///
    /// Returns `Ok(false)` when the Area does not exist.
    pub fn update_settings(&self, id: i64, settings: &AreaSettings) -> Result<bool> {
        let rows = lock(&self.conn)?
            .execute(
                "UPDATE areas SET title = ?1, description = ?2, action_options = ?3,
                    action_interval_secs = ?4, reaction_options = ?5, enabled = ?6,
                    updated_at = ?7
                 WHERE id = ?8",
                params![
                    settings.title,
                    settings.description,
                    settings.action_options.to_string(),
                    stored_interval(settings.action_interval_secs)?,
                    settings.reaction_options.to_string(),
                    settings.enabled,
                    Utc::now().to_rfc3339(),
                    id
                ],
            )
            .with_context(|| format!("Failed to update area {}", id))?;
        Ok(rows > 0)
    }

    /// Durably records the Action handler's new cursor.
    pub fn update_cursor(&self, id: i64, cursor: &Cursor) -> Result<bool> {
        let rows = lock(&self.conn)?
            .execute(
                "UPDATE areas SET cursor = ?1, updated_at = ?2 WHERE id = ?3",
                params![cursor.to_json_string(), Utc::now().to_rfc3339(), id],
            )
            .with_context(|| format!("Failed to update cursor of area {}", id))?;
        Ok(rows > 0)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = lock(&self.conn)?
            .execute("DELETE FROM areas WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete area {}", id))?;
        Ok(rows > 0)
    }

    fn query<P: rusqlite::ToSql>(&self, sql: &str, param: P) -> Result<Vec<Area>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(sql).context("Failed to prepare query")?;
        let mut rows = stmt.query(params![param]).context("Failed to execute query")?;
        let mut areas = Vec::new();
        while let Some(row) = rows.next()? {
            areas.push(row_to_area(row)?);
        }
        Ok(areas)
    }
}

fn stored_interval(secs: u64) -> Result<i64> {
    i64::try_from(secs)
        .with_context(|| format!("Action interval {} does not fit in storage", secs))
}

fn row_to_area(row: &rusqlite::Row<'_>) -> Result<Area> {
    let action_options: String = row.get(5)?;
    let action_interval_secs: i64 = row.get(6)?;
    let reaction_options: String = row.get(8)?;
    let cursor: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Area {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        action_id: row.get(4)?,
        action_options: serde_json::from_str(&action_options)
            .context("Failed to parse action_options")?,
        action_interval_secs: action_interval_secs.max(0) as u64,
        reaction_id: row.get(7)?,
        reaction_options: serde_json::from_str(&reaction_options)
            .context("Failed to parse reaction_options")?,
        enabled: row.get(9)?,
        cursor: Cursor::from_json_str(&cursor).context("Failed to parse cursor")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
