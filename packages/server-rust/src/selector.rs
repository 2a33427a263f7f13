//! Backend selector: legacy or frontend, per request.
//!
//! Rules are evaluated in a fixed order. Only the final sticky-bucket rule
//! may draw a random value, and only a freshly drawn value is written back
//! as a cookie.

use std::sync::Arc;

use bytes::Bytes;
use edgeroute_core::routing::{
    bucket_cookie, cookie_value, is_authenticated, parse_bucket_value, BUCKET_COOKIE,
};
use edgeroute_core::{Backend, Instance, RoutingDecision};
use http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use metrics::counter;
use rand::Rng;
use tracing::debug;

use crate::config::RoutingConfig;
use crate::resolver::PathResolver;

/// Prefixes always served by the frontend, without instance prefix.
const FRONTEND_PREFIXES: [&str; 4] = ["/_next/", "/_assets/", "/api/frontend/", "/api/auth/"];

/// Exact paths always served by the frontend, without instance prefix.
const FRONTEND_PATHS: [&str; 1] = ["/spenden"];

/// Prefixes always served by the legacy backend.
const LEGACY_PREFIXES: [&str; 2] = ["/auth/", "/user/register"];

/// Paths routed without consulting the path resolver.
const UNTYPED_PATHS: [&str; 2] = ["/", "/search"];

/// Toggle routes answered by the selector itself.
const TOGGLE_PATHS: [&str; 2] = ["/enable-frontend", "/disable-frontend"];

/// Whether `path` belongs to the frontend's own surface: toggle routes,
/// asset and API prefixes, and fixed frontend pages.
///
/// Such paths are never treated as resource ids.
#[must_use]
pub fn is_frontend_path(path: &str) -> bool {
    TOGGLE_PATHS.contains(&path)
        || FRONTEND_PATHS.contains(&path)
        || FRONTEND_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Source of fresh bucket values, uniform in `[0, 1)`.
pub trait BucketSource: Send + Sync {
    fn draw(&self) -> f64;
}

/// [`BucketSource`] backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl BucketSource for ThreadRngSource {
    fn draw(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Which rule produced a [`Route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    FrontendPath,
    LegacyPath,
    Authenticated,
    ContentOnly,
    UnsupportedType,
    Sticky,
    Drawn,
}

impl Reason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::FrontendPath => "frontend_path",
            Reason::LegacyPath => "legacy_path",
            Reason::Authenticated => "authenticated",
            Reason::ContentOnly => "content_only",
            Reason::UnsupportedType => "unsupported_type",
            Reason::Sticky => "sticky",
            Reason::Drawn => "drawn",
        }
    }
}

/// A request to be proxied to `backend`.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub backend: Backend,
    pub reason: Reason,
    /// Present when the bucket rule decided.
    pub decision: Option<RoutingDecision>,
    /// `Set-Cookie` value to attach to the backend's response.
    pub set_cookie: Option<String>,
}

impl Route {
    fn fixed(backend: Backend, reason: Reason) -> Self {
        Self {
            backend,
            reason,
            decision: None,
            set_cookie: None,
        }
    }

    /// Whether the frontend path gets the `/<instance>` prefix.
    #[must_use]
    pub fn prefixes_instance(&self) -> bool {
        self.reason != Reason::FrontendPath
    }
}

/// Outcome of [`BackendSelector::select`].
#[derive(Debug)]
pub enum Selection {
    /// Answer directly; nothing is proxied.
    Respond(Response<Bytes>),
    Route(Route),
}

/// Request attributes the selector looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub instance: Instance,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub cookies: Option<&'a str>,
}

impl<'a> RequestView<'a> {
    /// Reads path, query and `Cookie` header of a request to `instance`.
    #[must_use]
    pub fn new(instance: Instance, uri: &'a http::Uri, headers: &'a HeaderMap) -> Self {
        Self {
            instance,
            path: uri.path(),
            query: uri.query(),
            cookies: headers
                .get(header::COOKIE)
                .and_then(|value| value.to_str().ok()),
        }
    }

    fn has_query_param(&self, name: &str) -> bool {
        self.query.is_some_and(|query| {
            query
                .split('&')
                .any(|pair| pair.split('=').next() == Some(name))
        })
    }
}

/// Chooses the backend of requests to frontend-enabled instances.
pub struct BackendSelector {
    config: RoutingConfig,
    resolver: Arc<PathResolver>,
    bucket: Arc<dyn BucketSource>,
}

impl BackendSelector {
    #[must_use]
    pub fn new(
        config: RoutingConfig,
        resolver: Arc<PathResolver>,
        bucket: Arc<dyn BucketSource>,
    ) -> Self {
        Self {
            config,
            resolver,
            bucket,
        }
    }

    /// Decides how to serve `request`.
    pub async fn select(&self, request: RequestView<'_>) -> Selection {
        if let Some(response) = self.toggle(request.path) {
            return Selection::Respond(response);
        }

        let route = self.route(request).await;
        counter!(
            "edge_routing_decisions_total",
            "backend" => route.backend.as_str(),
            "reason" => route.reason.as_str(),
        )
        .increment(1);
        debug!(
            path = request.path,
            backend = %route.backend,
            reason = route.reason.as_str(),
            "backend selected"
        );
        Selection::Route(route)
    }

    async fn route(&self, request: RequestView<'_>) -> Route {
        let path = request.path;

        if FRONTEND_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            return Route::fixed(Backend::Frontend, Reason::FrontendPath);
        }
        if LEGACY_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            return Route::fixed(Backend::Legacy, Reason::LegacyPath);
        }
        if self.config.redirect_authenticated_to_legacy && is_authenticated(request.cookies) {
            return Route::fixed(Backend::Legacy, Reason::Authenticated);
        }
        if FRONTEND_PATHS.contains(&path) {
            return Route::fixed(Backend::Frontend, Reason::FrontendPath);
        }
        if request.has_query_param("contentOnly") {
            return Route::fixed(Backend::Legacy, Reason::ContentOnly);
        }
        if !UNTYPED_PATHS.contains(&path) && !self.supports_type(request.instance, path).await {
            return Route::fixed(Backend::Legacy, Reason::UnsupportedType);
        }

        let sticky = cookie_value(BUCKET_COOKIE, request.cookies).and_then(parse_bucket_value);
        let decision = match sticky {
            Some(value) => RoutingDecision::new(value, self.config.probability, true),
            None => RoutingDecision::new(self.bucket.draw(), self.config.probability, false),
        };

        Route {
            backend: decision.backend(),
            reason: if decision.sticky_cookie_present {
                Reason::Sticky
            } else {
                Reason::Drawn
            },
            set_cookie: decision
                .cookie_to_set()
                .map(|value| bucket_cookie(value, self.config.cookie_domain.as_deref())),
            decision: Some(decision),
        }
    }

    async fn supports_type(&self, instance: Instance, path: &str) -> bool {
        self.resolver
            .resolve(instance, path)
            .await
            .is_some_and(|info| self.config.allowed_types.contains(&info.type_name))
    }

    fn toggle(&self, path: &str) -> Option<Response<Bytes>> {
        let (body, value, backend) = match path {
            "/enable-frontend" => ("Enabled: Use of new frontend", 0.0, Backend::Frontend),
            "/disable-frontend" => ("Disabled: Use of new frontend", 1.0, Backend::Legacy),
            _ => return None,
        };
        counter!(
            "edge_routing_decisions_total",
            "backend" => backend.as_str(),
            "reason" => "toggle",
        )
        .increment(1);

        let mut response = Response::new(Bytes::from_static(body.as_bytes()));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain;charset=utf-8"),
        );
        headers.insert(header::REFRESH, HeaderValue::from_static("1; url=/"));
        let cookie = bucket_cookie(value, self.config.cookie_domain.as_deref());
        if let Ok(cookie) = HeaderValue::from_str(&cookie) {
            headers.insert(header::SET_COOKIE, cookie);
        }
        Some(response)
    }
}
