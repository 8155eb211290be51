//! Core data models for the photo asset lifecycle service.
//!
//! These entities describe managed assets, their lifecycle states, and the
//! adjacent bundle and audit records. They map cleanly to database tables
//! via `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod asset;
pub mod bundle;
pub mod lifecycle;
pub mod usage_log;
