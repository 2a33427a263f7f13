//! Inbound HTTP: listener configuration, middleware, handler, and lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use module::NetworkModule;
