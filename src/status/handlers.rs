use crate::node::service::NodeHandle;
use crate::node::types::NodeStatus;

use axum::{Extension, Json, http::StatusCode};

pub async fn handle_status(
    Extension(node): Extension<NodeHandle>,
) -> (StatusCode, Json<Option<NodeStatus>>) {
    match node.status().await {
        Ok(status) => (StatusCode::OK, Json(Some(status))),
        Err(e) => {
            tracing::error!("Failed to read node status: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(None))
        }
    }
}
