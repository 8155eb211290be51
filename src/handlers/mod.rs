//! HTTP handlers grouped by concern.

pub mod asset_handlers;
pub mod bundle_handlers;
pub mod health_handlers;
pub mod trash_handlers;
