//! OAuth state management for CSRF protection.
//!
//! Each authorization URL carries a single-use random state that the
//! callback must present back before its code is exchanged.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Pending authorization
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub service: String,
    /// Platform user that started the flow, if signed in
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// OAuth state manager with automatic expiration
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry_duration: Duration,
}

impl StateManager {
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, StateEntry>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generate a new state token (UUID v4) and store it
    pub fn create_state(&self, service: &str, user_id: Option<i64>) -> String {
        let state = Uuid::new_v4().to_string();
        let entry = StateEntry {
            service: service.to_string(),
            user_id,
            created_at: Utc::now(),
        };
        self.lock().insert(state.clone(), entry);
        state
    }

    /// Validate and consume a state token
    ///
    /// The state is removed even when expired (single-use).
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let entry = self.lock().remove(state)?;

        if Utc::now() - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Clean up expired states
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let expiry = self.expiry_duration;
        self.lock().retain(|_, entry| now - entry.created_at <= expiry);
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(remaining = manager.count(), "OAuth state cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate_state() {
        let manager = StateManager::new(600);

        let state = manager.create_state("github", Some(7));
        let entry = manager.validate_and_consume(&state).unwrap();
        assert_eq!(entry.service, "github");
        assert_eq!(entry.user_id, Some(7));
    }

    #[test]
    fn test_state_is_single_use() {
        let manager = StateManager::new(600);
        let state = manager.create_state("spotify", None);

        assert!(manager.validate_and_consume(&state).is_some());
        assert!(manager.validate_and_consume(&state).is_none());
    }

    #[test]
    fn test_invalid_state_rejected() {
        let manager = StateManager::new(600);
        assert!(manager.validate_and_consume("invalid_state").is_none());
    }

    #[test]
    fn test_expired_state_rejected() {
        // Negative lifetime: every state is already expired.
        let manager = StateManager::new(-1);
        let state = manager.create_state("github", None);
        assert!(manager.validate_and_consume(&state).is_none());
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let expired = StateManager::new(-1);
        expired.create_state("github", None);
        expired.create_state("spotify", None);
        assert_eq!(expired.count(), 2);
        expired.cleanup_expired();
        assert_eq!(expired.count(), 0);

        let live = StateManager::new(600);
        live.create_state("github", None);
        live.cleanup_expired();
        assert_eq!(live.count(), 1);
    }
}
