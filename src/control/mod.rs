//! Control API.
//!
//! A small axum server exposing the scheduler: status, start, stop, and a
//! single on-demand cycle. Bound to localhost by default. When a token is
//! configured, the POST actions require `Authorization: Bearer <token>`.

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::engine::scheduler::Scheduler;

/// Build the control router with all routes and middleware.
pub fn build_router(scheduler: Arc<Scheduler>, token: Option<SecretString>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let mut actions = Router::new()
        .route("/api/start", post(routes::start))
        .route("/api/stop", post(routes::stop))
        .route("/api/cycle", post(routes::run_cycle));
    if let Some(token) = token {
        actions = actions.route_layer(middleware::from_fn_with_state(
            Arc::new(token),
            routes::require_token,
        ));
    }

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .merge(actions)
        .layer(cors)
        .with_state(scheduler)
}

/// Bind the listener and serve the control API in a background task.
///
/// Binding happens before returning so an occupied port is reported to the
/// caller instead of being lost inside the task.
pub async fn spawn_control_server(
    scheduler: Arc<Scheduler>,
    bind: &str,
    port: u16,
    token: Option<SecretString>,
) -> Result<JoinHandle<()>> {
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("Invalid control bind address {bind}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control API on {addr}"))?;

    if token.is_none() {
        warn!(addr = %addr, "Control API actions are unauthenticated, set control.token_env");
    }
    let app = build_router(scheduler, token);
    info!(addr = %addr, "Control API listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Control API server error");
        }
    }))
}
