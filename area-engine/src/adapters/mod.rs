//! Built-in service adapters.

pub mod github;
pub mod http;
pub mod spotify;
pub mod timer;

use crate::adapter::ServiceAdapter;
use std::sync::Arc;

pub use github::GitHubAdapter;
pub use spotify::SpotifyAdapter;
pub use timer::TimerAdapter;

/// Every adapter the platform ships with, talking to the real providers.
pub fn default_adapters() -> Vec<Arc<dyn ServiceAdapter>> {
    vec![
        Arc::new(TimerAdapter::new()),
        Arc::new(GitHubAdapter::new()),
        Arc::new(SpotifyAdapter::new()),
    ]
}
