//! Edge router binary.
//!
//! Every setting can be given as a flag or an environment variable; see
//! `edge-server --help`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use edgeroute_core::Instance;
use edgeroute_server::cache::{MemoryCacheStore, DEFAULT_CACHE_CAPACITY};
use edgeroute_server::embed::HostBlocklist;
use edgeroute_server::fetch::ReqwestFetcher;
use edgeroute_server::selector::ThreadRngSource;
use edgeroute_server::{
    EdgeConfig, EdgeDeps, EdgeService, EmbedConfig, NetworkConfig, NetworkModule, RoutingConfig,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "edge-server")]
#[command(about = "Edge router between legacy and frontend backends")]
#[command(version)]
struct Args {
    /// Apex domain; instances are served from its subdomains
    #[arg(long, env = "EDGE_DOMAIN")]
    domain: String,

    /// Upstream GraphQL endpoint
    #[arg(long, env = "EDGE_API_ENDPOINT")]
    api_endpoint: String,

    /// Origin of the legacy backend, e.g. https://legacy.example.org
    #[arg(long, env = "EDGE_LEGACY_ORIGIN")]
    legacy_origin: String,

    /// Host of the frontend backend
    #[arg(long, env = "EDGE_FRONTEND_DOMAIN")]
    frontend_domain: String,

    /// Instances whose traffic is split between the backends
    #[arg(long, env = "EDGE_FRONTEND_INSTANCES", value_delimiter = ',', default_value = "de")]
    frontend_instances: Vec<Instance>,

    /// Share of new clients routed to the frontend
    #[arg(long, env = "EDGE_FRONTEND_PROBABILITY", default_value_t = 0.0)]
    probability: f64,

    /// Resource types the frontend renders
    #[arg(
        long,
        env = "EDGE_FRONTEND_ALLOWED_TYPES",
        value_delimiter = ',',
        default_value = "Page,Article"
    )]
    allowed_types: Vec<String>,

    /// Route signed-in users to the legacy backend
    #[arg(long, env = "EDGE_AUTHENTICATED_TO_LEGACY", default_value_t = true, action = clap::ArgAction::Set)]
    redirect_authenticated_to_legacy: bool,

    /// Domain attribute of the bucket cookie
    #[arg(long, env = "EDGE_COOKIE_DOMAIN")]
    cookie_domain: Option<String>,

    /// Hosts never fetched by the thumbnail endpoint
    #[arg(long, env = "EDGE_BLOCKED_HOSTS", value_delimiter = ',')]
    blocked_hosts: Vec<String>,

    /// Per-fetch timeout of thumbnail pipelines, in seconds
    #[arg(long, env = "EDGE_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    /// Timeout of API and backend requests, in seconds
    #[arg(long, env = "EDGE_BACKEND_TIMEOUT", default_value_t = 30)]
    backend_timeout: u64,

    /// Listen address
    #[arg(long, env = "EDGE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(short, long, env = "EDGE_PORT", default_value_t = 8080)]
    port: u16,

    /// Overall timeout of an inbound request, in seconds
    #[arg(long, env = "EDGE_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    /// Maximum number of cached path resolutions
    #[arg(long, env = "EDGE_CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "EDGE_LOG_JSON")]
    log_json: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "EDGE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Args {
    fn into_config(self) -> EdgeConfig {
        EdgeConfig {
            domain: self.domain,
            api_endpoint: self.api_endpoint,
            legacy_origin: self.legacy_origin,
            frontend_domain: self.frontend_domain,
            frontend_instances: self.frontend_instances,
            routing: RoutingConfig {
                probability: self.probability,
                allowed_types: self.allowed_types,
                redirect_authenticated_to_legacy: self.redirect_authenticated_to_legacy,
                cookie_domain: self.cookie_domain.filter(|domain| !domain.is_empty()),
            },
            embed: EmbedConfig {
                blocked_hosts: self.blocked_hosts,
                fetch_timeout: Duration::from_secs(self.fetch_timeout),
            },
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                request_timeout: Duration::from_secs(self.request_timeout),
                ..NetworkConfig::default()
            },
            backend_timeout: Duration::from_secs(self.backend_timeout),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let cache = MemoryCacheStore::with_capacity(args.cache_capacity);
    let config = args.into_config();
    config.validate().context("invalid configuration")?;
    info!(
        domain = %config.domain,
        frontend = %config.frontend_domain,
        probability = config.routing.probability,
        "starting edge router"
    );

    let blocklist = HostBlocklist::new(&config.embed.blocked_hosts);
    let media = ReqwestFetcher::for_media(config.embed.fetch_timeout, move |url| {
        blocklist.permits(url)
    })
    .context("building media client")?;
    let backends =
        ReqwestFetcher::for_backends(config.backend_timeout).context("building backend client")?;

    let config = Arc::new(config);
    let edge = EdgeService::new(
        Arc::clone(&config),
        EdgeDeps {
            cache: Arc::new(cache),
            backends: Arc::new(backends),
            media: Arc::new(media),
            bucket: Arc::new(ThreadRngSource),
        },
    );

    let mut network = NetworkModule::new(config.network.clone(), Arc::new(edge));
    let port = network.start().await?;
    info!(port, "edge router ready");

    network
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
