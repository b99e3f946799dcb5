//! gsctl-api — REST API for the game-server controller.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness |
//! | GET | `/readyz` | Store, broker and cluster checks |
//! | GET | `/api/v1/matches` | List match records |
//! | GET | `/api/v1/matches/{id}` | Get one match record |
//! | GET | `/api/v1/heartbeats` | List heartbeat records |
//! | PUT | `/api/v1/heartbeats` | Upsert a heartbeat record |
//! | POST | `/api/v1/commands/launch` | Publish a launch command to its region stream |
//! | POST | `/api/v1/commands/kill` | Publish a kill request |
//! | GET | `/api/v1/settings` | List game-server settings |
//! | GET | `/api/v1/settings/{mode}` | Get settings for a matchmaking mode |
//! | PUT | `/api/v1/settings/{mode}` | Upsert settings for a matchmaking mode |
//!
//! Every JSON response uses the `{ success, data?, error? }` envelope.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use gsctl_cluster::ClusterApi;
use gsctl_consumer::Broker;
use gsctl_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub broker: Arc<dyn Broker>,
    pub cluster: Arc<dyn ClusterApi>,
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/matches", get(handlers::list_matches))
        .route("/matches/{id}", get(handlers::get_match))
        .route(
            "/heartbeats",
            get(handlers::list_heartbeats).put(handlers::put_heartbeat),
        )
        .route("/commands/launch", post(handlers::launch_command))
        .route("/commands/kill", post(handlers::kill_command))
        .route("/settings", get(handlers::list_settings))
        .route(
            "/settings/{mode}",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz).with_state(state))
        .nest("/api/v1", api_routes)
}
