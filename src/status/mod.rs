//! Status Endpoint
//!
//! Read-only HTTP view of a node for operators: phase, routes, join flags and
//! outstanding calls, served as JSON on `GET /status`.

pub mod handlers;

use crate::node::service::NodeHandle;
use handlers::handle_status;

use anyhow::Result;
use axum::{Extension, Router, routing::get};
use std::net::SocketAddr;

pub const ENDPOINT_STATUS: &str = "/status";

pub fn router(node: NodeHandle) -> Router {
    Router::new()
        .route(ENDPOINT_STATUS, get(handle_status))
        .layer(Extension(node))
}

pub async fn serve(addr: SocketAddr, node: NodeHandle) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status endpoint listening on {}", addr);

    axum::serve(listener, router(node)).await?;

    Ok(())
}
