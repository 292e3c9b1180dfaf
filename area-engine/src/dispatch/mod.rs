//! Dispatch engine: one cancellable worker per enabled Area.
//!
//! ```text
//!        ┌──────────── cancel (disable/delete) ────────────┐
//!        ↓                                                  │
//!  ┌──────────┐  tick   ┌─────────┐  event  ┌──────────┐     │
//!  │   Idle   │───────→ │ Polling │───────→ │  Firing  │     │
//!  └──────────┘         └─────────┘         └──────────┘     │
//!        ↑   no event / error │                  │ result    │
//!        └────────────────────┴──────────────────┘           │
//! ```
//!
//! The worker owns all timing. Handlers never sleep; the next poll starts
//! one effective interval after the previous one started. The cursor is
//! persisted before the Reaction runs, so a crash mid-fire never replays
//! the event.

mod engine;
mod worker;

pub use engine::DispatchEngine;

use crate::oauth::TokenLifecycle;
use crate::registry::ServiceRegistry;
use area::store::{AreaResultStore, AreaStore, CatalogStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Wait used when the Area row itself cannot be read.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(10);

/// `max(area interval, action minimum)`: a user override can slow polling
/// down but never below what the provider tolerates.
pub fn effective_interval(area_interval_secs: u64, minimum_interval_secs: u64) -> Duration {
    Duration::from_secs(area_interval_secs.max(minimum_interval_secs))
}

/// What the workers share.
pub struct DispatchContext {
    pub areas: Arc<AreaStore>,
    pub results: Arc<AreaResultStore>,
    pub catalog: Arc<CatalogStore>,
    pub registry: Arc<ServiceRegistry>,
    pub tokens: Arc<TokenLifecycle>,
    /// Consecutive failures before a worker logs at error level
    pub failure_alert_threshold: u32,
}

/// Observability snapshot of one Area worker.
#[derive(Clone, Debug, Default, Serialize)]
pub struct WorkerStatus {
    /// Last completed Action poll
    pub last_poll: Option<DateTime<Utc>>,
    /// Last Reaction whose result was recorded
    pub last_fire: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub poll_count: u64,
    pub fire_count: u64,
    pub consecutive_failures: u32,
}
