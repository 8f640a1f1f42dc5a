//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: registry, orchestrator, upstream clients and adapters
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, ServicesError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<(Router, Arc<AppServices>), ServicesError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok((router(services.clone()), services))
}

/// Router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    routes::router().layer(ServiceBuilder::new().layer(Extension(services)))
}
