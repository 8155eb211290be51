//! src/lib.rs
//!
//! photo-vault: a photo asset lifecycle service. Assets are ingested into a
//! path-addressed object store with catalog rows in SQLite, rendered into
//! web variants, moved through a trash lifecycle, and exported in bulk as
//! tar.gz archives or via a native hand-off provider.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{AppConfig, RunMode};
pub use errors::AppError;
pub use state::AppState;
