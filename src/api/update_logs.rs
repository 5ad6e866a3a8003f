//! `/update-logs` routes: outcome history views and the windowed summary.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ApiState;
use super::automation::{LogEntry, LogsParams};
use super::envelope::ApiResponse;
use super::errors::ApiError;
use crate::domain::{OutcomeKind, OutcomeQuery, OutcomeStats, OutcomeSummary};

pub const DEFAULT_SUMMARY_DAYS: u32 = 7;
pub const MAX_SUMMARY_DAYS: u32 = 365;

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub days: Option<u32>,
}

fn limit_query(params: Result<Query<LimitParams>, QueryRejection>) -> Result<OutcomeQuery, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    LogsParams {
        limit: params.limit,
        ..LogsParams::default()
    }
    .into_query()
}

async fn fetch(state: &ApiState, query: &OutcomeQuery) -> Result<Vec<LogEntry>, ApiError> {
    let records = state
        .controller
        .recent_outcomes(query)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve update logs", &e))?;
    Ok(records.into_iter().map(LogEntry::from).collect())
}

pub async fn recent(
    State(state): State<ApiState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<LogEntry>>, ApiError> {
    let query = limit_query(params)?;
    let entries = fetch(&state, &query).await?;
    Ok(ApiResponse::ok("Update logs retrieved successfully.", entries))
}

pub async fn by_profile(
    State(state): State<ApiState>,
    Path(login): Path<String>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Result<ApiResponse<Value>, ApiError> {
    let mut query = limit_query(params)?;
    let account = state
        .controller
        .find_account(&login)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve profile logs", &e))?;
    let Some(account) = account else {
        return Ok(ApiResponse::refused(
            format!("Profile '{login}' not found."),
            json!({ "logs": [] }),
        ));
    };

    query.account_id = Some(account.id);
    let entries = fetch(&state, &query).await?;
    Ok(ApiResponse::ok(
        format!("Update logs for profile '{login}' retrieved successfully."),
        json!({ "account_id": account.id, "logs": entries }),
    ))
}

pub async fn by_outcome(
    State(state): State<ApiState>,
    Path(outcome): Path<String>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<LogEntry>>, ApiError> {
    let kind: OutcomeKind = outcome.parse().map_err(|_| {
        ApiError::bad_request(
            "Invalid outcome. Must be 'Success', 'Failure', 'NoChange', or 'Warning'.",
        )
    })?;
    let mut query = limit_query(params)?;
    query.kind = Some(kind);
    let entries = fetch(&state, &query).await?;
    Ok(ApiResponse::ok(
        format!("Update logs with outcome '{kind}' retrieved successfully."),
        entries,
    ))
}

pub async fn summary(
    State(state): State<ApiState>,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> Result<ApiResponse<OutcomeSummary>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let days = params.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
    if !(1..=MAX_SUMMARY_DAYS).contains(&days) {
        return Err(ApiError::bad_request(format!(
            "days must be between 1 and {MAX_SUMMARY_DAYS}"
        )));
    }
    let summary = state
        .controller
        .outcome_summary(days)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve logs summary", &e))?;
    Ok(ApiResponse::ok(
        format!("Update logs summary for last {days} days retrieved successfully."),
        summary,
    ))
}

pub async fn stats(State(state): State<ApiState>) -> Result<ApiResponse<OutcomeStats>, ApiError> {
    let stats = state
        .controller
        .outcome_stats()
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve logs statistics", &e))?;
    Ok(ApiResponse::ok("Update logs statistics retrieved successfully.", stats))
}

pub async fn weekly_stats(
    State(state): State<ApiState>,
) -> Result<ApiResponse<OutcomeStats>, ApiError> {
    let stats = state
        .controller
        .weekly_outcome_stats()
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve weekly logs statistics", &e))?;
    Ok(ApiResponse::ok(
        "Weekly update logs statistics retrieved successfully.",
        stats,
    ))
}
