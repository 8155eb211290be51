//! Service layer: storage seams, the asset catalog, and the lifecycle,
//! variant, retrieval, and delivery engines built on top of them.

pub mod delivery;
pub mod export;
pub mod metadata_store;
pub mod object_store;
pub mod retrieval;
pub mod trash_service;
pub mod variant_service;
