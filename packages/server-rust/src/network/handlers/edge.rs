//! Fallback handler: buffers the request and hands it to the edge service.

use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::AppState;

/// Serves any request by delegating to [`crate::edge::EdgeService`].
///
/// Bodies larger than the configured limit are answered with `413`.
pub async fn edge_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, "rejecting inbound body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    state
        .edge
        .handle(axum::http::Request::from_parts(parts, body))
        .await
        .map(Body::from)
}
