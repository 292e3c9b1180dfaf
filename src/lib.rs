// Error taxonomy shared by every layer
pub mod error;

// TOML + environment configuration
pub mod config;

// Encrypted OAuth credential storage
pub mod credentials;

// Relational store of record (users, catalog, areas, results)
pub mod store;

// Opaque per-Area cursor payload
pub mod cursor;

// Platform session tokens
pub mod session;

// Bearer token extraction
pub mod auth;

pub use cursor::Cursor;
pub use error::AreaError;
