//! `/automation` routes: start, stop, run-now, status, is-running and logs.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::ApiState;
use super::envelope::ApiResponse;
use super::errors::ApiError;
use crate::application::{ControlError, StartOutcome, StatusSnapshot, StopOutcome};
use crate::domain::{ChangedFields, OutcomeKind, OutcomeQuery, OutcomeRecord};

pub const DEFAULT_LOG_LIMIT: u32 = 50;
pub const MAX_LOG_LIMIT: u32 = 200;

pub async fn start(State(state): State<ApiState>) -> ApiResponse<Value> {
    match state.controller.start_schedule() {
        StartOutcome::Armed { next_run_at } => ApiResponse::ok(
            "Weekly maintenance automation started successfully.",
            json!({ "status": "running", "next_run_at": next_run_at }),
        ),
        StartOutcome::AlreadyArmed => ApiResponse::refused(
            "Automation scheduler is already running.",
            json!({ "status": "already_running" }),
        ),
    }
}

pub async fn stop(State(state): State<ApiState>) -> ApiResponse<Value> {
    match state.controller.stop() {
        StopOutcome::Stopped {
            scheduler_disarmed,
            batch_signalled,
        } => ApiResponse::ok(
            "Automation stopped successfully. Any running maintenance tasks will stop at the next safe point.",
            json!({
                "status": "stopped",
                "scheduler_disarmed": scheduler_disarmed,
                "batch_signalled": batch_signalled,
            }),
        ),
        StopOutcome::NotRunning => ApiResponse::ok(
            "Automation is not running.",
            json!({ "status": "not_running" }),
        ),
    }
}

pub async fn run_now(State(state): State<ApiState>) -> ApiResponse<Value> {
    match state.controller.run_now() {
        Ok(handle) => {
            info!("🚀 Immediate maintenance requested through the API");
            ApiResponse::ok(
                "Maintenance started immediately. Check logs for progress.",
                json!({ "status": "running_now", "started_at": handle.started_at() }),
            )
        }
        Err(ControlError::AlreadyRunning) => ApiResponse::refused(
            "Maintenance is already running. Please wait for it to complete or stop it first.",
            json!({ "status": "already_running" }),
        ),
    }
}

pub async fn status(State(state): State<ApiState>) -> Result<ApiResponse<StatusSnapshot>, ApiError> {
    let snapshot = state
        .controller
        .status()
        .await
        .map_err(|e| ApiError::internal("Failed to get automation status", &e))?;
    Ok(ApiResponse::ok("Automation status retrieved successfully.", snapshot))
}

#[derive(Debug, Serialize)]
pub struct RunningCheck {
    pub is_running: bool,
    pub scheduler_running: bool,
    pub task_running: bool,
    pub summary: &'static str,
}

pub async fn is_running(State(state): State<ApiState>) -> ApiResponse<RunningCheck> {
    let flags = state.controller.flags();
    let is_running = flags.scheduler_active || flags.batch_active;
    let summary = if is_running {
        "Automation is running"
    } else {
        "Automation is not running"
    };
    ApiResponse::ok(
        summary,
        RunningCheck {
            is_running,
            scheduler_running: flags.scheduler_active,
            task_running: flags.batch_active,
            summary,
        },
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub limit: Option<u32>,
    pub account_id: Option<i64>,
    pub outcome: Option<String>,
}

impl LogsParams {
    pub fn into_query(self) -> Result<OutcomeQuery, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LOG_LIMIT);
        if !(1..=MAX_LOG_LIMIT).contains(&limit) {
            return Err(ApiError::bad_request(format!(
                "limit must be between 1 and {MAX_LOG_LIMIT}"
            )));
        }
        let kind = self
            .outcome
            .as_deref()
            .map(str::parse::<OutcomeKind>)
            .transpose()
            .map_err(|_| {
                ApiError::bad_request(
                    "Invalid outcome. Must be 'Success', 'Failure', 'NoChange', or 'Warning'.",
                )
            })?;
        Ok(OutcomeQuery {
            account_id: self.account_id,
            kind,
            limit: Some(limit),
            ..OutcomeQuery::default()
        })
    }
}

/// One outcome record as shown in the log view.
#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: &'static str,
    pub message: String,
    pub account_id: i64,
    pub account_login: Option<String>,
    pub outcome: OutcomeKind,
    pub duration_ms: u64,
    pub changed_fields: ChangedFields,
}

impl From<OutcomeRecord> for LogEntry {
    fn from(record: OutcomeRecord) -> Self {
        let message = if record.detail.is_empty() {
            format!(
                "Profile {} {}",
                record.account_id,
                record.kind.as_str().to_lowercase()
            )
        } else {
            record.detail
        };
        Self {
            id: record.id,
            timestamp: record.executed_at,
            level: record.kind.level(),
            message,
            account_id: record.account_id,
            account_login: record.account_login,
            outcome: record.kind,
            duration_ms: record.duration_ms,
            changed_fields: record.changed_fields,
        }
    }
}

pub async fn logs(
    State(state): State<ApiState>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> Result<ApiResponse<Value>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let query = params.into_query()?;
    let records = state
        .controller
        .recent_outcomes(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to get automation logs", &e))?;
    let entries: Vec<LogEntry> = records.into_iter().map(LogEntry::from).collect();
    Ok(ApiResponse::ok(
        "Automation logs retrieved successfully.",
        json!({ "logs": entries }),
    ))
}
