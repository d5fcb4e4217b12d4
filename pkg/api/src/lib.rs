pub mod admission;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod request_id;
pub mod server;

use std::sync::Arc;

use pkg_metrics::MetricsRegistry;
use pkg_state::ObjectStore;
use pkg_types::Registry;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub registry: Arc<Registry>,
    pub metrics: Arc<MetricsRegistry>,
    pub join_token: String,
}
