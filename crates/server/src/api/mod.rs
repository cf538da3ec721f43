//! Proxy operations behind the HTTP handlers. Each one forwards to the
//! backend through the shared gateway and leaves response shaping to
//! `main.rs`.

use std::future::Future;

use axum::http::StatusCode;
use gateway::{
    CallBudget, ExportFile, Forwarded, GatewayError, EXPORT_ENDPOINT, EXPORT_STATS_ENDPOINT,
    GENERATE_ENDPOINT, VALIDATE_ENDPOINT,
};
use serde_json::Value;
use shared::{
    error::ApiError,
    protocol::{ExportFilters, ExportQuery},
};
use tracing::{info, warn};

use crate::app_state::AppState;

pub fn validate_route() -> &'static str {
    "/api/orders/validate"
}

pub fn generate_route() -> &'static str {
    "/api/orders/generate"
}

pub fn export_route() -> &'static str {
    "/api/orders/export"
}

pub fn export_stats_route() -> &'static str {
    "/api/orders/export/stats"
}

pub(crate) async fn validate_order(state: &AppState, body: &Value) -> Result<Forwarded, GatewayError> {
    relay_order(state, VALIDATE_ENDPOINT, body).await
}

pub(crate) async fn generate_care_plan(
    state: &AppState,
    body: &Value,
) -> Result<Forwarded, GatewayError> {
    relay_order(state, GENERATE_ENDPOINT, body).await
}

pub(crate) async fn export_stats(
    state: &AppState,
    filters: &ExportFilters,
) -> Result<Forwarded, GatewayError> {
    let forwarded = bounded(
        state,
        EXPORT_STATS_ENDPOINT,
        state.gateway.relay_query(EXPORT_STATS_ENDPOINT, filters),
    )
    .await?;
    info!(status = forwarded.status, "export stats relayed");
    Ok(forwarded)
}

pub(crate) async fn export_orders(
    state: &AppState,
    query: &ExportQuery,
) -> Result<ExportFile, GatewayError> {
    bounded(
        state,
        EXPORT_ENDPOINT,
        state.gateway.export(query.format, &query.filters),
    )
    .await
}

async fn relay_order(
    state: &AppState,
    endpoint: &str,
    body: &Value,
) -> Result<Forwarded, GatewayError> {
    let forwarded = bounded(state, endpoint, state.gateway.relay(endpoint, body)).await?;
    info!(endpoint, status = forwarded.status, "order request relayed");
    Ok(forwarded)
}

async fn bounded<T, F>(state: &AppState, endpoint: &str, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match state.upstream_timeout {
        Some(limit) => CallBudget::new(limit).run(endpoint, call).await,
        None => call.await,
    }
}

/// Status and `{ detail }` body for a failed upstream call. Backend statuses
/// pass through; failures with no backend status become gateway errors.
pub fn error_response(err: &GatewayError) -> (StatusCode, ApiError) {
    let status = match err {
        GatewayError::Backend { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        GatewayError::Timeout { .. } | GatewayError::Cancelled { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        GatewayError::Network { .. } | GatewayError::Decode { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::InvalidUrl { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let detail = match err {
        GatewayError::Backend { message, .. } => message.clone(),
        other => other.to_string(),
    };
    warn!(status = status.as_u16(), %detail, "proxy request failed");
    (status, ApiError::new(detail))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
