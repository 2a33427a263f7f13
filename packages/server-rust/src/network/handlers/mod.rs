//! Axum handler and shared state of the edge server.
//!
//! The router has no routes of its own: every request, whatever its path,
//! reaches [`edge_handler`].

pub mod edge;

pub use edge::edge_handler;

use std::sync::Arc;

use crate::edge::EdgeService;

/// Shared application state passed to the handler via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub edge: Arc<EdgeService>,
    /// Limit applied when buffering inbound bodies.
    pub max_body_bytes: usize,
}
