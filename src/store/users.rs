//! Platform users.
//!
//! A user created through an OAuth login has no password hash.

use super::{lock, open_connection, parse_timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
}

pub struct UserStore {
    conn: Mutex<Connection>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

impl UserStore {
    /// Opens (or creates) the SQLite database and ensures the table exists.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = open_connection(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT NOT NULL,
                email         TEXT NOT NULL UNIQUE,
                password_hash TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);",
        )
        .context("Failed to create users table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts a user. Fails if the email is already taken.
    pub fn save(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user.username, user.email, user.password_hash, now.to_rfc3339()],
        )
        .with_context(|| format!("Failed to insert user {}", user.email))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rewrites username, email and password hash; bumps `updated_at`.
    pub fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        lock(&self.conn)?
            .execute(
                "UPDATE users SET username = ?1, email = ?2, password_hash = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    user.username,
                    user.email,
                    user.password_hash,
                    now.to_rfc3339(),
                    user.id
                ],
            )
            .with_context(|| format!("Failed to update user {}", user.id))?;

        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        self.find_one(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS), id)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            email,
        )
    }

    /// Usernames are not unique; returns the oldest match.
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one(
            &format!(
                "SELECT {} FROM users WHERE username = ?1 ORDER BY id LIMIT 1",
                USER_COLUMNS
            ),
            username,
        )
    }

    fn find_one<P: rusqlite::ToSql>(&self, sql: &str, param: P) -> Result<Option<User>> {
        let conn = lock(&self.conn)?;
        let raw = conn
            .query_row(sql, params![param], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()
            .context("Failed to query users")?;

        raw.map(|(id, username, email, password_hash, created_at, updated_at)| {
            Ok(User {
                id,
                username,
                email,
                password_hash,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory_store() -> UserStore {
        UserStore::new(":memory:").expect("in-memory store failed")
    }

    fn oauth_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: None,
        }
    }

    #[test]
    fn test_save_and_find() {
        let store = in_memory_store();
        let saved = store.save(&oauth_user("alice", "alice@example.com")).unwrap();

        assert_eq!(store.find_by_id(saved.id).unwrap(), Some(saved.clone()));
        assert_eq!(
            store.find_by_email("alice@example.com").unwrap().map(|u| u.id),
            Some(saved.id)
        );
        assert_eq!(
            store.find_by_username("alice").unwrap().map(|u| u.id),
            Some(saved.id)
        );
        assert!(saved.password_hash.is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = in_memory_store();
        store.save(&oauth_user("alice", "alice@example.com")).unwrap();
        assert!(store.save(&oauth_user("alice2", "alice@example.com")).is_err());
    }

    #[test]
    fn test_update() {
        let store = in_memory_store();
        let mut user = store.save(&oauth_user("bob", "bob@example.com")).unwrap();
        user.username = "robert".to_string();

        let updated = store.update(&user).unwrap();
        assert!(updated.updated_at >= user.created_at);
        assert_eq!(store.find_by_id(user.id).unwrap().unwrap().username, "robert");
    }

    #[test]
    fn test_missing_user() {
        let store = in_memory_store();
        assert!(store.find_by_id(99).unwrap().is_none());
        assert!(store.find_by_email("nobody@example.com").unwrap().is_none());
    }
}
