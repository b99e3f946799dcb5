//! REST API handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{info, warn};

use gsctl_consumer::broker::{EXCHANGE, kill_routing_key, launch_routing_key};
use gsctl_consumer::BrokerError;
use gsctl_core::{KillServerRequestedEvent, LaunchGameServerCommand, MatchId, MatchmakingMode};
use gsctl_state::{GameServerSettings, ServerHeartbeatRecord};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

// ── Probes ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> &'static str {
    "OK"
}

/// Result of each readiness check, `"ok"` or the failure message.
#[derive(Debug, Serialize)]
pub struct Readiness {
    pub store: String,
    pub broker: String,
    pub cluster: String,
}

impl Readiness {
    fn is_ready(&self) -> bool {
        self.store == "ok" && self.broker == "ok" && self.cluster == "ok"
    }
}

fn check(result: Result<(), String>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => e,
    }
}

/// GET /readyz
pub async fn readyz(State(state): State<ApiState>) -> impl IntoResponse {
    let readiness = Readiness {
        store: check(state.store.ping().map_err(|e| e.to_string())),
        broker: check(if state.broker.is_connected() {
            Ok(())
        } else {
            Err("disconnected".to_string())
        }),
        cluster: check(state.cluster.ping().await.map_err(|e| e.to_string())),
    };

    if readiness.is_ready() {
        ApiResponse::ok(readiness).into_response()
    } else {
        warn!(?readiness, "not ready");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                data: Some(readiness),
                error: Some("not ready".to_string()),
            }),
        )
            .into_response()
    }
}

// ── Matches ────────────────────────────────────────────────────

/// GET /api/v1/matches
pub async fn list_matches(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_matches() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/matches/{id}
pub async fn get_match(
    State(state): State<ApiState>,
    Path(id): Path<MatchId>,
) -> impl IntoResponse {
    match state.store.get_match(id) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => error_response("match not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal(e),
    }
}

// ── Heartbeats ─────────────────────────────────────────────────

/// GET /api/v1/heartbeats
pub async fn list_heartbeats(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_heartbeats() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => internal(e),
    }
}

/// PUT /api/v1/heartbeats
pub async fn put_heartbeat(
    State(state): State<ApiState>,
    Json(record): Json<ServerHeartbeatRecord>,
) -> impl IntoResponse {
    if record.url.is_empty() {
        return error_response("url must not be empty", StatusCode::BAD_REQUEST).into_response();
    }
    match state.store.put_heartbeat(&record) {
        Ok(()) => ApiResponse::ok(record).into_response(),
        Err(e) => internal(e),
    }
}

// ── Commands ───────────────────────────────────────────────────

/// Where an accepted command was routed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub exchange: &'static str,
    pub routing_key: String,
}

async fn publish<T: Serialize>(state: &ApiState, routing_key: String, msg: &T) -> axum::response::Response {
    let body = match serde_json::to_vec(msg) {
        Ok(body) => body,
        Err(e) => return internal(e),
    };
    match state.broker.publish(EXCHANGE, &routing_key, body).await {
        Ok(()) => {
            info!(routing_key = %routing_key, "command published");
            (
                StatusCode::ACCEPTED,
                ApiResponse::ok(Accepted {
                    exchange: EXCHANGE,
                    routing_key,
                }),
            )
                .into_response()
        }
        Err(e @ BrokerError::Unroutable { .. }) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => {
            warn!(routing_key = %routing_key, error = %e, "failed to publish command");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
    }
}

/// POST /api/v1/commands/launch
pub async fn launch_command(
    State(state): State<ApiState>,
    Json(cmd): Json<LaunchGameServerCommand>,
) -> impl IntoResponse {
    publish(&state, launch_routing_key(&cmd.region), &cmd).await
}

/// POST /api/v1/commands/kill
pub async fn kill_command(
    State(state): State<ApiState>,
    Json(evt): Json<KillServerRequestedEvent>,
) -> impl IntoResponse {
    publish(&state, kill_routing_key().to_string(), &evt).await
}

// ── Settings ───────────────────────────────────────────────────

/// GET /api/v1/settings
pub async fn list_settings(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_settings() {
        Ok(settings) => ApiResponse::ok(settings).into_response(),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/settings/{mode}
pub async fn get_settings(
    State(state): State<ApiState>,
    Path(mode): Path<i32>,
) -> impl IntoResponse {
    match state.store.get_settings(MatchmakingMode(mode)) {
        Ok(Some(settings)) => ApiResponse::ok(settings).into_response(),
        Ok(None) => error_response("settings not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal(e),
    }
}

/// PUT /api/v1/settings/{mode}
///
/// The path decides the mode; a conflicting `matchmaking_mode` in the body
/// is rejected.
pub async fn put_settings(
    State(state): State<ApiState>,
    Path(mode): Path<i32>,
    Json(settings): Json<GameServerSettings>,
) -> impl IntoResponse {
    if settings.matchmaking_mode != MatchmakingMode(mode) {
        return error_response(
            &format!(
                "body mode {} does not match path mode {mode}",
                settings.matchmaking_mode
            ),
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    if settings.image.is_empty() || settings.tickrate == 0 {
        return error_response("image and tickrate are required", StatusCode::BAD_REQUEST)
            .into_response();
    }
    match state.store.put_settings(&settings) {
        Ok(()) => {
            info!(%mode, image = %settings.image, tickrate = settings.tickrate, "gameserver settings updated");
            ApiResponse::ok(settings).into_response()
        }
        Err(e) => internal(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use gsctl_cluster::MemoryCluster;
    use gsctl_consumer::broker::StreamBinding;
    use gsctl_consumer::{Broker, MemoryBroker};
    use gsctl_core::Region;
    use gsctl_state::{MatchResourceRecord, StateStore, Status};

    use super::*;
    use crate::build_router;

    struct TestApp {
        state: ApiState,
        broker: MemoryBroker,
    }

    fn test_app() -> TestApp {
        let broker = MemoryBroker::new();
        let state = ApiState {
            store: StateStore::open_in_memory().unwrap(),
            broker: Arc::new(broker.clone()),
            cluster: Arc::new(MemoryCluster::new()),
        };
        TestApp { state, broker }
    }

    async fn call(
        state: &ApiState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn launch_body(match_id: i64, region: &str) -> serde_json::Value {
        serde_json::json!({
            "matchId": match_id,
            "lobbyType": 1,
            "gameMode": 1,
            "map": "dota",
            "region": region,
        })
    }

    #[tokio::test]
    async fn healthz_is_plain_ok() {
        let app = test_app();
        let resp = build_router(app.state)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn readyz_reflects_broker_connection() {
        let app = test_app();
        let (status, json) = call(&app.state, "GET", "/readyz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["broker"], "ok");

        app.broker.disconnect();
        let (status, json) = call(&app.state, "GET", "/readyz", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["success"], false);
        assert_eq!(json["data"]["broker"], "disconnected");
        assert_eq!(json["data"]["store"], "ok");
    }

    #[tokio::test]
    async fn get_match_found_and_missing() {
        let app = test_app();
        app.state
            .store
            .insert_match(&MatchResourceRecord {
                match_id: 77,
                job_name: "gameserver-job-77".to_string(),
                secret_name: "gameserver-secrets-77".to_string(),
                config_map_name: "gameserver-config-77".to_string(),
                created_at: 1000,
                status: Status::Running,
            })
            .unwrap();

        let (status, json) = call(&app.state, "GET", "/api/v1/matches/77", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "running");

        let (status, json) = call(&app.state, "GET", "/api/v1/matches", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let (status, json) = call(&app.state, "GET", "/api/v1/matches/78", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn heartbeat_upsert_then_list() {
        let app = test_app();
        let body = serde_json::json!({ "url": "10.0.0.1:30500", "matchId": 5, "timestamp": 1000 });
        let (status, _) = call(&app.state, "PUT", "/api/v1/heartbeats", Some(body)).await;
        assert_eq!(status, StatusCode::OK);

        let body = serde_json::json!({ "url": "10.0.0.1:30500", "matchId": 5, "timestamp": 1010 });
        call(&app.state, "PUT", "/api/v1/heartbeats", Some(body)).await;

        let (_, json) = call(&app.state, "GET", "/api/v1/heartbeats", None).await;
        let list = json["data"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["timestamp"], 1010);
    }

    #[tokio::test]
    async fn launch_command_routes_by_region() {
        let app = test_app();
        let binding = StreamBinding::launch(&Region::new("eu_czech"));
        app.broker.declare(&binding);

        let (status, json) = call(
            &app.state,
            "POST",
            "/api/v1/commands/launch",
            Some(launch_body(9, "eu_czech")),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["data"]["routingKey"], "LaunchGameServerCommand.eu_czech");
        assert_eq!(app.broker.depth(&binding.queue), 1);
    }

    #[tokio::test]
    async fn launch_to_unknown_region_is_not_found() {
        let app = test_app();
        app.broker.declare(&StreamBinding::launch(&Region::new("eu_czech")));

        let (status, _) = call(
            &app.state,
            "POST",
            "/api/v1/commands/launch",
            Some(launch_body(9, "us_east")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn kill_command_with_broker_down_is_unavailable() {
        let app = test_app();
        let binding = StreamBinding::kill();
        app.broker.declare(&binding);

        let body = serde_json::json!({ "matchId": 3 });
        let (status, _) = call(&app.state, "POST", "/api/v1/commands/kill", Some(body.clone())).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        app.broker.disconnect();
        let (status, _) = call(&app.state, "POST", "/api/v1/commands/kill", Some(body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!app.broker.is_connected());
    }

    #[tokio::test]
    async fn settings_upsert_and_read() {
        let app = test_app();
        let body = serde_json::json!({
            "matchmaking_mode": 0,
            "tickrate": 30,
            "image": "dota2classic/gameserver:ranked",
            "load_timeout": 300,
            "cpu_affinity": true,
        });
        let (status, _) = call(&app.state, "PUT", "/api/v1/settings/0", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = call(&app.state, "GET", "/api/v1/settings/0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["image"], "dota2classic/gameserver:ranked");

        let (status, _) = call(&app.state, "PUT", "/api/v1/settings/1", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app.state, "GET", "/api/v1/settings/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = call(&app.state, "GET", "/api/v1/settings", None).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
    }
}
