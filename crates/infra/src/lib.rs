//! Infrastructure layer: job orchestration, external service clients,
//! catalog storage and the sync adapters that tie them together.

pub mod adapters;
pub mod catalog_store;
pub mod external;
pub mod jobs;
