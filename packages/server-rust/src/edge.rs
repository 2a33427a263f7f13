//! The edge: one inbound request in, one response out.
//!
//! Dispatch by subdomain:
//!
//! - `embed.<domain>`: thumbnail endpoint, answered by the [`EmbedResolver`].
//! - `<instance>.<domain>`: canonical redirects first. For frontend-enabled
//!   instances the [`BackendSelector`] then picks the backend to proxy to;
//!   other instances go to the legacy backend.
//! - anything else is proxied to the legacy backend unchanged.

use std::sync::Arc;

use bytes::Bytes;
use edgeroute_core::{Backend, Instance, ThumbnailResult};
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use reqwest::Url;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::cache::CacheStore;
use crate::config::EdgeConfig;
use crate::embed::EmbedResolver;
use crate::fetch::{strip_hop_by_hop, FetchError, HttpFetch};
use crate::resolver::PathResolver;
use crate::selector::{
    is_frontend_path, BackendSelector, BucketSource, RequestView, Route, Selection,
};

/// Subdomain serving thumbnails.
const EMBED_SUBDOMAIN: &str = "embed";

/// Failure to reach a backend; answered with `502 Bad Gateway`.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("backend request failed: {0}")]
    Backend(#[from] FetchError),
    #[error("could not build backend request: {0}")]
    Request(#[from] http::Error),
}

/// Where a request is headed, judged by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Embed,
    Instance(Instance),
    Other,
}

/// External collaborators of an [`EdgeService`].
pub struct EdgeDeps {
    pub cache: Arc<dyn CacheStore>,
    /// Used for the upstream API and both backends.
    pub backends: Arc<dyn HttpFetch>,
    /// Used for media providers.
    pub media: Arc<dyn HttpFetch>,
    pub bucket: Arc<dyn BucketSource>,
}

/// Composes resolver, selector and embed resolver into a request handler.
pub struct EdgeService {
    config: Arc<EdgeConfig>,
    resolver: Arc<PathResolver>,
    selector: BackendSelector,
    embeds: EmbedResolver,
    backends: Arc<dyn HttpFetch>,
}

impl EdgeService {
    #[must_use]
    pub fn new(config: Arc<EdgeConfig>, deps: EdgeDeps) -> Self {
        let api = ApiClient::new(config.api_endpoint.clone(), Arc::clone(&deps.backends));
        let resolver = Arc::new(PathResolver::new(deps.cache, api));
        let selector =
            BackendSelector::new(config.routing.clone(), Arc::clone(&resolver), deps.bucket);
        let embeds = EmbedResolver::new(deps.media, &config.embed);

        Self {
            config,
            resolver,
            selector,
            embeds,
            backends: deps.backends,
        }
    }

    /// Answers `request`.
    ///
    /// Never fails: a backend that cannot be reached yields `502`.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let result = match self.site(&request) {
            Site::Embed => Ok(self.thumbnail(&request).await),
            Site::Instance(instance) => self.instance_request(instance, request).await,
            Site::Other => self.passthrough(request).await,
        };

        result.unwrap_or_else(|err| {
            warn!(error = %err, "backend unavailable");
            plain(StatusCode::BAD_GATEWAY, "Bad Gateway")
        })
    }

    fn site(&self, request: &Request<Bytes>) -> Site {
        let Some(host) = request_host(request) else {
            return Site::Other;
        };
        let Some(subdomain) = host
            .strip_suffix(self.config.domain.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
        else {
            return Site::Other;
        };

        if subdomain == EMBED_SUBDOMAIN {
            Site::Embed
        } else {
            subdomain.parse().map_or(Site::Other, Site::Instance)
        }
    }

    async fn thumbnail(&self, request: &Request<Bytes>) -> Response<Bytes> {
        let embed_url = (request.uri().path() == "/thumbnail")
            .then(|| query_param(request.uri().query(), "url"))
            .flatten()
            .filter(|url| !url.is_empty());

        let result = match embed_url {
            Some(url) => self.embeds.resolve(&url).await,
            None => ThumbnailResult::Placeholder,
        };

        let mut response = Response::new(result.body());
        let headers = response.headers_mut();
        if let Ok(content_type) = HeaderValue::from_str(result.content_type()) {
            headers.insert(header::CONTENT_TYPE, content_type);
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(result.content_length()));
        response
    }

    async fn instance_request(
        &self,
        instance: Instance,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, EdgeError> {
        let uri = request.uri();
        let path = uri.path();

        if path == "/user/public" {
            return Ok(redirect(StatusCode::FOUND, "/user/me"));
        }
        if looks_like_id(path) && !is_frontend_path(path) && !is_xhr(request.headers()) {
            if let Some(location) = self.canonical_location(instance, path, uri.query()).await {
                debug!(path, %location, "redirecting to canonical path");
                return Ok(redirect(StatusCode::MOVED_PERMANENTLY, &location));
            }
        }

        if !self.config.frontend_instances.contains(&instance) {
            return self.passthrough(request).await;
        }

        let view = RequestView::new(instance, request.uri(), request.headers());
        match self.selector.select(view).await {
            Selection::Respond(response) => Ok(response),
            Selection::Route(route) => self.proxy(instance, &route, request).await,
        }
    }

    /// URL to redirect to when the canonical instance or path differ.
    async fn canonical_location(
        &self,
        instance: Instance,
        path: &str,
        query: Option<&str>,
    ) -> Option<String> {
        let info = self.resolver.resolve(instance, path).await?;
        let target = info.instance.unwrap_or(instance);
        let current_path = encode_path(&info.current_path)?;

        if target == instance && current_path == encode_path(path)? {
            return None;
        }
        let location = with_query(
            format!("https://{target}.{}{current_path}", self.config.domain),
            query,
        );
        Some(format!("{location}{}", info.fragment.as_deref().unwrap_or_default()))
    }

    async fn proxy(
        &self,
        instance: Instance,
        route: &Route,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, EdgeError> {
        let uri = request.uri();
        let target = match route.backend {
            Backend::Frontend => {
                let path = if route.prefixes_instance() {
                    let prefixed = format!("/{instance}{}", uri.path());
                    prefixed.trim_end_matches('/').to_string()
                } else {
                    uri.path().to_string()
                };
                with_query(format!("https://{}{path}", self.config.frontend_domain), uri.query())
            }
            Backend::Legacy => self.legacy_url(&request),
        };

        let mut response = self.forward(route.backend, &target, request).await?;
        if let Some(cookie) = &route.set_cookie {
            if let Ok(cookie) = HeaderValue::from_str(cookie) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
        }
        Ok(response)
    }

    async fn passthrough(&self, request: Request<Bytes>) -> Result<Response<Bytes>, EdgeError> {
        let target = self.legacy_url(&request);
        self.forward(Backend::Legacy, &target, request).await
    }

    fn legacy_url(&self, request: &Request<Bytes>) -> String {
        let origin = self.config.legacy_origin.trim_end_matches('/');
        with_query(format!("{origin}{}", request.uri().path()), request.uri().query())
    }

    /// Sends `request` to `target` and returns the backend's answer as a
    /// fresh response.
    async fn forward(
        &self,
        backend: Backend,
        target: &str,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, EdgeError> {
        let (parts, body) = request.into_parts();

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        if backend == Backend::Frontend {
            headers.remove(header::HOST);
        }

        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(target)
            .body(body)?;
        *outbound.headers_mut() = headers;

        debug!(%backend, target, "proxying request");
        let upstream = self.backends.send(outbound).await?;

        let (parts, body) = upstream.into_parts();
        let mut response = Response::new(body);
        *response.status_mut() = parts.status;
        *response.headers_mut() = parts.headers;
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

/// Lower-cased host of `request` without port.
fn request_host(request: &Request<Bytes>) -> Option<String> {
    let raw = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())?;
    let host = raw.rsplit_once(':').map_or(raw, |(host, _port)| host);
    Some(host.trim_end_matches('.').to_ascii_lowercase())
}

/// Decoded value of the first `name` parameter in `query`.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let parsed = Url::parse(&format!("http://edge.invalid/?{}", query?)).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Percent-encoded form of an absolute path, as a browser would send it.
fn encode_path(path: &str) -> Option<String> {
    let base = Url::parse("http://edge.invalid/").ok()?;
    Some(base.join(path).ok()?.path().to_string())
}

/// `/<digits>` or `/<segment>/<digits>`, optionally followed by more segments.
fn looks_like_id(path: &str) -> bool {
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let mut segments = rest.split('/');
    match (segments.next(), segments.next()) {
        (Some(first), _) if is_number(first) => true,
        (Some(first), Some(second)) => !first.is_empty() && is_number(second),
        _ => false,
    }
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .is_some_and(|value| value == "XMLHttpRequest")
}

fn with_query(url: String, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{url}?{query}"),
        None => url,
    }
}

fn redirect(status: StatusCode, location: &str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    if let Ok(location) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain;charset=utf-8"),
    );
    response
}


#[cfg(test)]
mod tests {
    use edgeroute_core::PLACEHOLDER_PNG;
    use http::Method;

    use super::testing::{backends, config, get, service};
    use super::*;
    use crate::fetch::testing::{image, MockFetch};

    fn body(response: &Response<Bytes>) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    fn set_cookies(response: &Response<Bytes>) -> Vec<&str> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect()
    }

    #[test]
    fn id_like_paths() {
        for path in ["/42", "/42/", "/mathe/1555", "/mathe/1555/zylinder", "/1/foo/bar"] {
            assert!(looks_like_id(path), "{path}");
        }
        for path in ["/", "/mathe", "/mathe/zylinder", "//42", "/42a", "/mathe/15a5", ""] {
            assert!(!looks_like_id(path), "{path}");
        }
    }

    #[test]
    fn query_param_decodes_value() {
        assert_eq!(
            query_param(Some("url=https%3A%2F%2Fyoutu.be%2Fx&a=1"), "url").as_deref(),
            Some("https://youtu.be/x")
        );
        assert_eq!(query_param(Some("a=1"), "url"), None);
        assert_eq!(query_param(None, "url"), None);
    }

    #[tokio::test]
    async fn unknown_hosts_pass_through_to_legacy() {
        for host in ["example.org", "en.example.org", "www.example.org", "other.test"] {
            let http = backends();
            let svc = service(config(1.0), http.clone(), MockFetch::offline(), 0.0);
            let response = svc.handle(get(host, "/mathe?foo=bar")).await;

            assert_eq!(body(&response), "legacy.example.org");
            assert_eq!(set_cookies(&response), vec!["backend=1"]);
            assert_eq!(http.urls(), vec!["https://legacy.example.org/mathe?foo=bar".to_string()]);
            http.with_request(0, |req| assert_eq!(req.headers()[header::HOST], host));
        }
    }

    #[tokio::test]
    async fn drawn_frontend_request_gets_bucket_cookie() {
        let http = backends();
        let svc = service(config(0.5), http.clone(), MockFetch::offline(), 0.25);

        let mut request = get("de.example.org", "/mathe?x=1");
        request
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        let response = svc.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "frontend.example.org");
        assert_eq!(set_cookies(&response), vec!["backend=1", "useFrontend=0.25; path=/"]);
        assert!(response.headers().get(header::CONNECTION).is_none());

        let urls = http.urls();
        assert_eq!(urls.last().unwrap(), "https://frontend.example.org/de/mathe?x=1");
        http.with_request(http.count() - 1, |req| {
            assert!(req.headers().get(header::HOST).is_none());
            assert!(req.headers().get(header::CONNECTION).is_none());
        });
    }

    #[tokio::test]
    async fn drawn_legacy_request_keeps_host() {
        let http = backends();
        let svc = service(config(0.5), http.clone(), MockFetch::offline(), 0.75);
        let response = svc.handle(get("de.example.org", "/mathe")).await;

        assert_eq!(body(&response), "legacy.example.org");
        assert_eq!(set_cookies(&response), vec!["backend=1", "useFrontend=0.75; path=/"]);
        http.with_request(http.count() - 1, |req| {
            assert_eq!(req.headers()[header::HOST], "de.example.org");
        });
    }

    #[tokio::test]
    async fn root_maps_to_instance_path() {
        let http = backends();
        let svc = service(config(1.0), http.clone(), MockFetch::offline(), 0.5);
        svc.handle(get("de.example.org", "/")).await;
        assert_eq!(http.urls(), vec!["https://frontend.example.org/de".to_string()]);
    }

    #[tokio::test]
    async fn special_frontend_paths_keep_their_path() {
        let http = backends();
        let svc = service(config(0.0), http.clone(), MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/_next/static/app.js")).await;

        assert_eq!(set_cookies(&response), vec!["backend=1"]);
        assert_eq!(
            http.urls(),
            vec!["https://frontend.example.org/_next/static/app.js".to_string()]
        );
    }

    #[tokio::test]
    async fn authenticated_user_goes_to_legacy_without_cookie() {
        let http = backends();
        let svc = service(config(1.0), http.clone(), MockFetch::offline(), 0.0);

        let mut request = get("de.example.org", "/mathe");
        request
            .headers_mut()
            .insert(header::COOKIE, HeaderValue::from_static("authenticated=1"));
        let response = svc.handle(request).await;

        assert_eq!(body(&response), "legacy.example.org");
        assert_eq!(set_cookies(&response), vec!["backend=1"]);
    }

    #[tokio::test]
    async fn method_and_body_are_forwarded() {
        let http = backends();
        let svc = service(config(0.0), http.clone(), MockFetch::offline(), 0.9);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::HOST, "de.example.org")
            .body(Bytes::from_static(b"user=a"))
            .unwrap();
        svc.handle(request).await;

        http.with_request(0, |req| {
            assert_eq!(req.method(), Method::POST);
            assert_eq!(req.body().as_ref(), b"user=a");
            assert_eq!(req.uri(), "https://legacy.example.org/auth/login");
        });
    }

    #[tokio::test]
    async fn toggles_are_answered_directly() {
        let http = backends();
        let svc = service(config(0.0), http.clone(), MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/enable-frontend")).await;

        assert_eq!(body(&response), "Enabled: Use of new frontend");
        assert_eq!(set_cookies(&response), vec!["useFrontend=0; path=/"]);
        assert_eq!(http.count(), 0);
    }

    #[tokio::test]
    async fn id_paths_redirect_to_canonical_path() {
        let svc = service(config(0.0), backends(), MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/42")).await;

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "https://de.example.org/mathe");
    }

    #[tokio::test]
    async fn canonical_redirect_keeps_query() {
        let svc = service(config(0.0), backends(), MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/42?foo=bar")).await;

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://de.example.org/mathe?foo=bar"
        );
    }

    #[tokio::test]
    async fn frontend_paths_with_numbers_are_not_redirected() {
        for (path, target) in [
            ("/_assets/2020/logo.png", "https://frontend.example.org/_assets/2020/logo.png"),
            ("/_next/1234/chunk.js", "https://frontend.example.org/_next/1234/chunk.js"),
            ("/api/frontend/42", "https://frontend.example.org/api/frontend/42"),
        ] {
            let http = backends();
            let svc = service(config(0.0), http.clone(), MockFetch::offline(), 0.9);
            let response = svc.handle(get("de.example.org", path)).await;

            assert_eq!(response.status(), StatusCode::OK, "{path}");
            assert_eq!(body(&response), "frontend.example.org");
            assert_eq!(http.urls(), vec![target.to_string()]);
        }
    }

    #[tokio::test]
    async fn instances_without_frontend_still_redirect() {
        let http = backends();
        let svc = service(config(1.0), http.clone(), MockFetch::offline(), 0.0);

        let response = svc.handle(get("en.example.org", "/42")).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "https://de.example.org/mathe");

        let response = svc.handle(get("en.example.org", "/user/public")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/user/me");

        let response = svc.handle(get("en.example.org", "/mathe")).await;
        assert_eq!(body(&response), "legacy.example.org");
        assert_eq!(set_cookies(&response), vec!["backend=1"]);
        assert_eq!(http.urls().last().unwrap(), "https://legacy.example.org/mathe");
    }

    #[tokio::test]
    async fn canonical_redirect_switches_instance_and_adds_fragment() {
        let http = MockFetch::new(|_| {
            crate::fetch::testing::json_body(&serde_json::json!({ "data": { "uuid": {
                "__typename": "Comment",
                "id": 65395,
                "instance": "en",
                "legacyObject": { "alias": "/math/1555/cylinder" },
            } } }))
        });
        let svc = service(config(0.0), http, MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/65395")).await;

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://en.example.org/math/1555/cylinder#comment-65395"
        );
    }

    #[tokio::test]
    async fn canonical_paths_are_not_redirected() {
        let http = MockFetch::new(|req| match req.uri().host() {
            Some("api.example.org") => crate::fetch::testing::json_body(&serde_json::json!({
                "data": { "uuid": { "__typename": "Page", "alias": "/mathe/1555/größe" } }
            })),
            _ => crate::fetch::testing::text("page"),
        });
        let svc = service(config(0.0), http, MockFetch::offline(), 0.9);
        let response = svc
            .handle(get("de.example.org", "/mathe/1555/gr%C3%B6%C3%9Fe"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "page");
    }

    #[tokio::test]
    async fn xhr_and_unresolvable_paths_are_not_redirected() {
        let svc = service(config(0.0), backends(), MockFetch::offline(), 0.9);
        let mut request = get("de.example.org", "/42");
        request
            .headers_mut()
            .insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert_eq!(svc.handle(request).await.status(), StatusCode::OK);

        let offline_api = MockFetch::new(|req| match req.uri().host() {
            Some("api.example.org") => crate::fetch::testing::status(503),
            _ => crate::fetch::testing::text("legacy"),
        });
        let svc = service(config(0.0), offline_api, MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/42")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "legacy");
    }

    #[tokio::test]
    async fn user_public_redirects_to_own_profile() {
        let svc = service(config(0.0), backends(), MockFetch::offline(), 0.9);
        let response = svc.handle(get("de.example.org", "/user/public")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/user/me");
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let svc = service(config(0.0), MockFetch::offline(), MockFetch::offline(), 0.9);
        let response = svc.handle(get("example.org", "/")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn thumbnail_endpoint_returns_image() {
        let media = MockFetch::new(|_| image("image/jpeg", 11464));
        let svc = service(config(0.0), backends(), media.clone(), 0.9);
        let response = svc
            .handle(get(
                "embed.example.org",
                "/thumbnail?url=https%3A%2F%2Fyoutu.be%2FKtV2wlp9Ts4",
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11464");
        assert_eq!(response.body().len(), 11464);
    }

    #[tokio::test]
    async fn thumbnail_endpoint_falls_back_to_placeholder() {
        for path in [
            "/thumbnail",
            "/thumbnail?url=",
            "/thumbnail?url=42",
            "/thumbnail?url=https%3A%2F%2Fwww.twitch.tv%2Fvideos%2F824398155",
            "/other?url=https%3A%2F%2Fyoutu.be%2FKtV2wlp9Ts4",
        ] {
            let media = MockFetch::new(|_| image("image/jpeg", 1));
            let svc = service(config(0.0), backends(), media.clone(), 0.9);
            let response = svc.handle(get("embed.example.org", path)).await;

            assert_eq!(response.status(), StatusCode::OK, "{path}");
            assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
            assert_eq!(response.body().as_ref(), PLACEHOLDER_PNG);
            assert_eq!(
                response.headers()[header::CONTENT_LENGTH],
                PLACEHOLDER_PNG.len().to_string().as_str()
            );
            assert_eq!(media.count(), 0, "{path}");
        }
    }
}
