//! REST control surface
//!
//! Thin axum layer over `MaintenanceController`. Every route except
//! `/health` requires `Authorization: Bearer <token>` when a token is
//! configured, and every response uses the `{success, message, data}`
//! envelope.

pub mod automation;
pub mod envelope;
pub mod errors;
pub mod update_logs;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{Value, json};
use tracing::info;

use crate::application::MaintenanceController;
use envelope::ApiResponse;
use errors::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct ApiState {
    pub controller: MaintenanceController,
    /// `None` leaves the surface open; only sensible on a loopback bind.
    pub api_token: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(controller: MaintenanceController, api_token: Option<String>) -> Self {
        Self {
            controller,
            api_token: api_token
                .filter(|token| !token.trim().is_empty())
                .map(Arc::from),
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/automation/start", post(automation::start))
        .route("/automation/stop", post(automation::stop))
        .route("/automation/run-now", post(automation::run_now))
        .route("/automation/status", get(automation::status))
        .route("/automation/is-running", get(automation::is_running))
        .route("/automation/logs", get(automation::logs))
        .route("/update-logs", get(update_logs::recent))
        .route("/update-logs/summary", get(update_logs::summary))
        .route("/update-logs/stats", get(update_logs::stats))
        .route("/update-logs/stats/weekly", get(update_logs::weekly_stats))
        .route("/update-logs/profile/:login", get(update_logs::by_profile))
        .route("/update-logs/outcome/:outcome", get(update_logs::by_outcome))
        .route_layer(from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(from_fn(request_log_middleware))
        .with_state(state)
}

async fn health() -> ApiResponse<Value> {
    ApiResponse::ok(
        "Service is healthy.",
        json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
    )
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn request_log_middleware(request: Request, next: Next) -> Response {
    let rid = request_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    info!(
        "api_request request_id={} method={} path={} status={} elapsed_ms={}",
        rid,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    if let Ok(value) = HeaderValue::from_str(&rid) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn require_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        Some(_) => Err(ApiError::unauthorized("Invalid API token.")),
        None => Err(ApiError::unauthorized("Missing bearer token.")),
    }
}
