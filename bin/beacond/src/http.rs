//! HTTP announcement and query endpoints
//!
//! Thin layer over the stores: decode, validate the announcement
//! environment, dispatch, map errors to status codes. Backing-store
//! failures surface as 5xx; retry is the client's job.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use beacon_common::{DynamicAnnouncement, Error, NodeId, Services};
use beacon_store::{DynamicStore, ServiceQuery};
use std::fmt::Write;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub dynamic: Arc<DynamicStore>,
    pub query: ServiceQuery,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/service/{type}", get(get_services))
        .route("/v1/service/{type}/{pool}", get(get_services_in_pool))
        .route("/v1/announcement/{node_id}", put(put_announcement))
        .route("/v1/announcement/{node_id}", delete(delete_announcement))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error wrapper mapping store errors onto HTTP responses
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.0.to_string()).into_response()
    }
}

async fn get_services(
    State(state): State<Arc<AppState>>,
    Path(service_type): Path<String>,
) -> Result<Json<Services>, ApiError> {
    Ok(Json(state.query.services(&service_type).await?))
}

async fn get_services_in_pool(
    State(state): State<Arc<AppState>>,
    Path((service_type, pool)): Path<(String, String)>,
) -> Result<Json<Services>, ApiError> {
    Ok(Json(state.query.services_in_pool(&service_type, &pool).await?))
}

async fn put_announcement(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<Uuid>,
    Json(announcement): Json<DynamicAnnouncement>,
) -> Result<StatusCode, ApiError> {
    if announcement.environment != state.query.environment() {
        return Err(ApiError(Error::WrongEnvironment {
            expected: state.query.environment().to_string(),
            actual: announcement.environment,
        }));
    }

    let node_id = NodeId::from_uuid(node_id);
    let fresh = state.dynamic.put(node_id, &announcement).await?;
    debug!(%node_id, fresh, "announcement accepted");

    // The freshness signal is best-effort; it only picks the status code.
    if fresh {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::ACCEPTED)
    }
}

async fn delete_announcement(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.dynamic.delete(NodeId::from_uuid(node_id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Reaper counters in Prometheus text format
async fn metrics(State(state): State<Arc<AppState>>) -> String {
    let stats = state.dynamic.reaper_stats();
    let mut out = String::new();

    let _ = writeln!(out, "# HELP beacon_reaper_passes_total Completed reaper passes");
    let _ = writeln!(out, "# TYPE beacon_reaper_passes_total counter");
    let _ = writeln!(out, "beacon_reaper_passes_total {}", stats.passes);

    let _ = writeln!(out, "# HELP beacon_reaper_columns_total Expired columns physically removed");
    let _ = writeln!(out, "# TYPE beacon_reaper_columns_total counter");
    let _ = writeln!(out, "beacon_reaper_columns_total {}", stats.columns_reaped);

    let _ = writeln!(out, "# HELP beacon_reaper_errors_total Reaper passes that failed");
    let _ = writeln!(out, "# TYPE beacon_reaper_errors_total counter");
    let _ = writeln!(out, "beacon_reaper_errors_total {}", stats.errors);

    out
}
