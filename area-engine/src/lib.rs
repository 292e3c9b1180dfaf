//! AREA automation engine.
//!
//! Users bind an Action of one service (a condition polled on the
//! provider) to a Reaction of another (an operation run when the condition
//! fires). This crate hosts everything that runs those bindings.
//!
//! # Architecture
//!
//! ```text
//!      Provider APIs (GitHub, Spotify, ...)
//!                 ↑
//! ┌─────────────────────────────────────────┐
//! │   Service adapters (ServiceAdapter)      │
//! │  - Describe Actions / Reactions          │
//! │  - Poll and invoke against the provider  │
//! └─────────────────────────────────────────┘
//!                 ↑
//! ┌──────────────────┐   ┌──────────────────┐
//! │ ServiceRegistry  │   │ TokenLifecycle   │
//! │  name → handler  │   │  OAuth + refresh │
//! └──────────────────┘   └──────────────────┘
//!                 ↑
//! ┌─────────────────────────────────────────┐
//! │   DispatchEngine (one worker per Area)   │
//! │  - Poll, persist cursor, fire, record    │
//! └─────────────────────────────────────────┘
//!                 ↑
//!          AreaService / HTTP API
//! ```
//!
//! Persistence, credentials, sessions and configuration live in the `area`
//! crate.

pub mod adapter;
pub mod adapters;
pub mod api;
pub mod areas;
pub mod dispatch;
pub mod oauth;
pub mod registry;

pub use adapter::{
    ActionPoller, AdapterError, Identity, OAuthConfig, PollOutcome, PollRequest, ReactionInvoker,
    ReactionRequest, ServiceAdapter,
};
pub use areas::{AreaPatch, AreaService};
pub use dispatch::{DispatchContext, DispatchEngine, WorkerStatus};
pub use oauth::TokenLifecycle;
pub use registry::ServiceRegistry;

// Re-exported for adapter authors
pub use area::credentials::Credentials;
pub use area::{AreaError, Cursor};
