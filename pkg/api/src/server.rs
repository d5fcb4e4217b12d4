use axum::{
    Router, middleware,
    routing::{get, post},
};
use pkg_allocation::{Cancellation, RetryPolicy};
use pkg_controllers::{ClaimController, PoolController};
use pkg_metrics::{ClaimRecorder, MetricsRegistry, PoolRecorder};
use pkg_state::leader::LeaderElection;
use pkg_state::typed;
use pkg_state::{MemoryStore, ObjectStore, StateStore};
use pkg_types::{Namespace, Registry, ResourceKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::auth_middleware;
use crate::handlers::{claims, kinds, metrics, namespaces, pools, quotas, watch as watch_handler};
use crate::request_id::request_id_middleware;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub data_dir: String,
    pub join_token: String,
    pub server_id: String,
    /// Keep state in memory only; nothing survives a restart.
    pub in_memory: bool,
    pub pool_resync: Duration,
    pub claim_resync: Duration,
    pub retry: RetryPolicy,
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let (store, durable): (Arc<dyn ObjectStore>, Option<StateStore>) = if config.in_memory {
        info!("Using in-memory state store");
        (Arc::new(MemoryStore::new()), None)
    } else {
        let store = StateStore::new(&config.data_dir).await?;
        (Arc::new(store.clone()), Some(store))
    };
    let metrics = Arc::new(MetricsRegistry::new());

    seed_default_namespaces(store.as_ref()).await?;

    // Only the lease holder runs controllers; the others stand by.
    let election = LeaderElection::new(store.clone(), config.server_id.clone());
    let (_leader_handle, leader_rx) = election.start();
    let standby = Cancellation::from_watch(standby_signal(leader_rx));

    PoolController::new(store.clone(), PoolRecorder::new(metrics.clone()))
        .with_interval(config.pool_resync)
        .with_retry_policy(config.retry.clone())
        .with_cancellation(standby.clone())
        .start();
    ClaimController::new(store.clone(), ClaimRecorder::new(metrics.clone()))
        .with_interval(config.claim_resync)
        .with_retry_policy(config.retry.clone())
        .with_cancellation(standby)
        .start();

    let state = AppState {
        store,
        registry: Arc::new(Registry::with_defaults()),
        metrics,
        join_token: config.join_token,
    };

    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(store) = durable {
        store.close().await?;
    }
    info!("API server stopped");
    Ok(())
}

pub fn router(state: AppState) -> Router {
    // Protected API routes
    let api_routes = Router::new()
        .route("/api/v1/kinds", get(kinds::list_kinds))
        .route("/api/v1/watch", get(watch_handler::watch_events))
        .route(
            "/api/v1/namespaces",
            post(namespaces::create_namespace).get(namespaces::list_namespaces),
        )
        .route(
            "/api/v1/namespaces/{ns}",
            get(namespaces::get_namespace)
                .put(namespaces::update_namespace)
                .delete(namespaces::delete_namespace),
        )
        .route(
            "/api/v1/resourcepools",
            post(pools::create_pool).get(pools::list_pools),
        )
        .route(
            "/api/v1/resourcepools/{name}",
            get(pools::get_pool)
                .put(pools::update_pool)
                .delete(pools::delete_pool),
        )
        .route("/api/v1/resourcepoolclaims", get(claims::list_all_claims))
        .route(
            "/api/v1/namespaces/{ns}/resourcepoolclaims",
            post(claims::create_claim).get(claims::list_claims),
        )
        .route(
            "/api/v1/namespaces/{ns}/resourcepoolclaims/{name}",
            get(claims::get_claim)
                .put(claims::update_claim)
                .delete(claims::delete_claim),
        )
        .route("/api/v1/resourcequotas", get(quotas::list_all_quotas))
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas",
            get(quotas::list_quotas),
        )
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas/{name}",
            get(quotas::get_quota),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Public routes + merged
    Router::new()
        .route("/metrics", get(metrics::render_metrics))
        .merge(api_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// `true` while this server does not hold the leader lease. If the election
/// task ends, the server stays in standby.
fn standby_signal(mut leader_rx: watch::Receiver<bool>) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(!*leader_rx.borrow());
    tokio::spawn(async move {
        while leader_rx.changed().await.is_ok() {
            let standby = !*leader_rx.borrow_and_update();
            if tx.send(standby).is_err() {
                return;
            }
        }
        warn!("Leader election stopped, controllers on standby");
        let _ = tx.send(true);
    });
    rx
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Seed default and system namespaces on startup.
async fn seed_default_namespaces(store: &dyn ObjectStore) -> anyhow::Result<()> {
    for name in pkg_constants::namespaces::DEFAULT_NAMESPACES {
        let key = ResourceKind::Namespace.key("", name);
        match typed::write(store, &key, &Namespace::new(name), None).await {
            Ok(_) => info!("Seeded namespace: {}", name),
            Err(e) if e.is_conflict() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
