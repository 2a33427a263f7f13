//! Edge router server: splits traffic between a legacy and a frontend
//! backend, redirects to canonical paths, and serves embed thumbnails.
//!
//! Components, leaf first:
//!
//! - [`cache`]: key-value store with TTL for path resolutions
//! - [`fetch`]: outbound HTTP behind the [`fetch::HttpFetch`] trait
//! - [`api`]: client of the upstream GraphQL API
//! - [`resolver`]: `(instance, path)` to canonical path info
//! - [`selector`]: legacy or frontend, with sticky bucketing
//! - [`embed`]: thumbnail extraction for known media providers
//! - [`edge`]: composes the above into one request handler
//! - [`network`]: axum listener, middleware, and lifecycle

pub mod api;
pub mod cache;
pub mod config;
pub mod edge;
pub mod embed;
pub mod fetch;
pub mod network;
pub mod resolver;
pub mod selector;

pub use config::{ConfigError, EdgeConfig, EmbedConfig, RoutingConfig};
pub use edge::{EdgeDeps, EdgeError, EdgeService};
pub use network::{NetworkConfig, NetworkModule};
