//! Edge configuration, read-only once the server is running.

use std::time::Duration;

use edgeroute_core::Instance;
use reqwest::Url;

use crate::network::NetworkConfig;

/// Top-level configuration of the edge router.
///
/// Built once at startup and shared as `Arc<EdgeConfig>`; nothing mutates it
/// afterwards.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// Apex domain whose subdomains select the instance (`de.<domain>`).
    pub domain: String,
    /// Endpoint of the upstream GraphQL API.
    pub api_endpoint: String,
    /// Origin (`scheme://host[:port]`) of the legacy backend.
    pub legacy_origin: String,
    /// Host of the frontend backend.
    pub frontend_domain: String,
    /// Instances whose traffic is split between the two backends.
    pub frontend_instances: Vec<Instance>,
    /// Traffic-splitting settings.
    pub routing: RoutingConfig,
    /// Thumbnail extraction settings.
    pub embed: EmbedConfig,
    /// Listener settings.
    pub network: NetworkConfig,
    /// Timeout applied to every request to the API and the backends.
    pub backend_timeout: Duration,
}

/// Settings of the backend selector.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Share of clients routed to the frontend, in `[0, 1]`.
    pub probability: f64,
    /// Resource types the frontend is able to render.
    pub allowed_types: Vec<String>,
    /// Route signed-in users to the legacy backend.
    pub redirect_authenticated_to_legacy: bool,
    /// Domain attribute of the bucket cookie (without leading dot).
    pub cookie_domain: Option<String>,
}

/// Settings of the embed resolver.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Hosts that are never fetched, including their subdomains.
    pub blocked_hosts: Vec<String>,
    /// Timeout of each individual fetch of a pipeline.
    pub fetch_timeout: Duration,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            domain: "example.org".to_string(),
            api_endpoint: "https://api.example.org/graphql".to_string(),
            legacy_origin: "https://legacy.example.org".to_string(),
            frontend_domain: "frontend.example.org".to_string(),
            frontend_instances: vec![Instance::De],
            routing: RoutingConfig::default(),
            embed: EmbedConfig::default(),
            network: NetworkConfig::default(),
            backend_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            probability: 0.0,
            allowed_types: vec!["Page".to_string(), "Article".to_string()],
            redirect_authenticated_to_legacy: true,
            cookie_domain: None,
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            blocked_hosts: Vec::new(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration problems detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("routing probability must be within [0, 1], got {0}")]
    Probability(f64),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is not a valid http(s) url: {value:?}")]
    InvalidUrl { field: &'static str, value: String },
}

impl EdgeConfig {
    /// Checks the settings that would otherwise fail on the first request.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.routing.probability) {
            return Err(ConfigError::Probability(self.routing.probability));
        }
        if self.domain.is_empty() {
            return Err(ConfigError::Empty { field: "domain" });
        }
        if self.frontend_domain.is_empty() {
            return Err(ConfigError::Empty {
                field: "frontend_domain",
            });
        }
        for (field, value) in [
            ("api_endpoint", &self.api_endpoint),
            ("legacy_origin", &self.legacy_origin),
        ] {
            let valid = Url::parse(value)
                .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());
            if !valid {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}
