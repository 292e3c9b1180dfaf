//! Append-only log of Reaction outcomes.

use super::{lock, open_connection, parse_timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AreaResult {
    pub id: i64,
    pub area_id: i64,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

pub struct AreaResultStore {
    conn: Mutex<Connection>,
}

impl AreaResultStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = open_connection(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS area_results (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                area_id    INTEGER NOT NULL,
                result     TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_area_results_area ON area_results(area_id);",
        )
        .context("Failed to create area_results table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn save(&self, area_id: i64, result: &str) -> Result<AreaResult> {
        let now = Utc::now();
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO area_results (area_id, result, created_at) VALUES (?1, ?2, ?3)",
            params![area_id, result, now.to_rfc3339()],
        )
        .with_context(|| format!("Failed to save result for area {}", area_id))?;

        Ok(AreaResult {
            id: conn.last_insert_rowid(),
            area_id,
            result: result.to_string(),
            created_at: now,
        })
    }

    /// Results of one Area, oldest first.
    pub fn find_by_area(&self, area_id: i64) -> Result<Vec<AreaResult>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, area_id, result, created_at FROM area_results
                 WHERE area_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare query")?;
        let mut rows = stmt.query(params![area_id])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let created_at: String = row.get(3)?;
            results.push(AreaResult {
                id: row.get(0)?,
                area_id: row.get(1)?,
                result: row.get(2)?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(results)
    }

    /// Removes the log of a deleted Area. Returns the number of rows removed.
    pub fn delete_by_area(&self, area_id: i64) -> Result<usize> {
        lock(&self.conn)?
            .execute("DELETE FROM area_results WHERE area_id = ?1", params![area_id])
            .with_context(|| format!("Failed to delete results of area {}", area_id))
    }
}
