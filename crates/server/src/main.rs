use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gateway::{Forwarded, GatewayError, HttpGateway};
use serde_json::Value;
use shared::{
    error::ApiError,
    protocol::{ExportFilters, ExportQuery},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

type ApiFailure = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let gateway = HttpGateway::new(&settings.backend_url)
        .with_context(|| format!("invalid backend url '{}'", settings.backend_url))?;
    let state = AppState {
        gateway,
        upstream_timeout: settings.upstream_timeout,
        max_body_bytes: settings.max_body_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(
        %addr,
        backend_url = %settings.backend_url,
        upstream_timeout_secs = settings.upstream_timeout.map(|t| t.as_secs()),
        "care plan proxy listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = RequestBodyLimitLayer::new(state.max_body_bytes);
    Router::new()
        .route("/healthz", get(healthz))
        .route(api::validate_route(), post(http_validate_order))
        .route(api::generate_route(), post(http_generate_care_plan))
        .route(api::export_route(), get(http_export_orders))
        .route(api::export_stats_route(), get(http_export_stats))
        .layer(body_limit)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_validate_order(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiFailure> {
    let forwarded = api::validate_order(&state, &body).await.map_err(failure)?;
    Ok(relayed(forwarded))
}

async fn http_generate_care_plan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiFailure> {
    let forwarded = api::generate_care_plan(&state, &body)
        .await
        .map_err(failure)?;
    Ok(relayed(forwarded))
}

async fn http_export_stats(
    State(state): State<Arc<AppState>>,
    filters: Result<Query<ExportFilters>, QueryRejection>,
) -> Result<(StatusCode, Json<Value>), ApiFailure> {
    let Query(filters) = filters.map_err(rejected_query)?;
    let forwarded = api::export_stats(&state, &filters).await.map_err(failure)?;
    Ok(relayed(forwarded))
}

async fn http_export_orders(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<Response, ApiFailure> {
    let Query(query) = query.map_err(rejected_query)?;
    let file = api::export_orders(&state, &query).await.map_err(failure)?;
    info!(
        format = %query.format,
        filename = %file.filename,
        size_bytes = file.bytes.len(),
        "export relayed"
    );
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

fn relayed(forwarded: Forwarded) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(forwarded.body))
}

fn rejected_query(rejection: QueryRejection) -> ApiFailure {
    let detail = rejection.body_text();
    warn!(%detail, "export query rejected");
    (StatusCode::BAD_REQUEST, Json(ApiError::new(detail)))
}

fn failure(err: GatewayError) -> ApiFailure {
    let (status, body) = api::error_response(&err);
    (status, Json(body))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
