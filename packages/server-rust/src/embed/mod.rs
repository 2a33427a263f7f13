//! Embed resolver: third-party embed URL to thumbnail image.
//!
//! Each supported provider implements [`MediaPipeline`], which turns the
//! provider id extracted by [`classify`] into candidate media URLs. The
//! shared [`MediaClient`] then fetches candidates in order. Any failure at
//! any hop ends in [`ThumbnailResult::Placeholder`].

mod geogebra;
mod vimeo;
mod wikimedia;
mod youtube;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edgeroute_core::{Image, ThumbnailResult};
use http::{header, Method, Request, Response, StatusCode};
use metrics::counter;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::EmbedConfig;
use crate::fetch::{FetchError, HttpFetch};

/// Media services with a known extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    YouTube,
    Vimeo,
    Wikimedia,
    GeoGebra,
    Unknown,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::YouTube => "youtube",
            ProviderKind::Vimeo => "vimeo",
            ProviderKind::Wikimedia => "wikimedia",
            ProviderKind::GeoGebra => "geogebra",
            ProviderKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An embed URL with its provider and the provider-specific id token.
///
/// The id is taken from the URL as-is; each pipeline validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedTarget {
    pub provider: ProviderKind,
    pub provider_id: String,
    pub raw_url: String,
}

/// Identifies the provider of `raw_url` from its host and path.
#[must_use]
pub fn classify(raw_url: &str) -> EmbedTarget {
    let matched = Url::parse(raw_url).ok().and_then(|url| {
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        let matchers: [(ProviderKind, fn(&str, &Url) -> Option<String>); 4] = [
            (ProviderKind::YouTube, youtube::provider_id),
            (ProviderKind::Vimeo, vimeo::provider_id),
            (ProviderKind::Wikimedia, wikimedia::provider_id),
            (ProviderKind::GeoGebra, geogebra::provider_id),
        ];
        matchers
            .into_iter()
            .find_map(|(kind, matcher)| matcher(&host, &url).map(|id| (kind, id)))
    });

    let (provider, provider_id) = matched.unwrap_or((ProviderKind::Unknown, String::new()));
    EmbedTarget {
        provider,
        provider_id,
        raw_url: raw_url.to_string(),
    }
}

/// Why a pipeline hop failed.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("no pipeline for this url")]
    UnknownProvider,
    #[error("malformed provider id {0:?}")]
    MalformedId(String),
    #[error("refusing to fetch {0}")]
    Blocked(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not build request: {0}")]
    Request(#[from] http::Error),
    #[error("provider answered with status {0}")]
    Status(StatusCode),
    #[error("response is not an image (content-type {0:?})")]
    NotAnImage(Option<String>),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected metadata: {0}")]
    Unexpected(&'static str),
    #[error("malformed media url {0:?}")]
    MalformedUrl(String),
    #[error("pipeline produced no media url")]
    NoCandidate,
}

/// Hosts that are never contacted, including all of their subdomains.
#[derive(Debug, Clone, Default)]
pub struct HostBlocklist {
    hosts: Vec<String>,
}

impl HostBlocklist {
    #[must_use]
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.as_ref().trim_end_matches('.').to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if `url` may be fetched.
    ///
    /// Only `http`/`https` URLs without userinfo whose host is not blocked
    /// are permitted.
    #[must_use]
    pub fn permits(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if !url.username().is_empty() || url.password().is_some() {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        !self.hosts.iter().any(|blocked| {
            host == *blocked
                || host
                    .strip_suffix(blocked.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

/// Fetches metadata and media for the pipelines.
///
/// Every hop is checked against the blocklist first and bounded by the
/// configured timeout.
pub struct MediaClient {
    http: Arc<dyn HttpFetch>,
    blocklist: HostBlocklist,
    timeout: Duration,
}

impl MediaClient {
    #[must_use]
    pub fn new(http: Arc<dyn HttpFetch>, blocklist: HostBlocklist, timeout: Duration) -> Self {
        Self {
            http,
            blocklist,
            timeout,
        }
    }

    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, EmbedError> {
        let response = tokio::time::timeout(self.timeout, self.http.send(request))
            .await
            .map_err(|_| EmbedError::Timeout(self.timeout))??;
        if !response.status().is_success() {
            return Err(EmbedError::Status(response.status()));
        }
        Ok(response)
    }

    fn request(&self, method: Method, url: &Url, body: Bytes) -> Result<Request<Bytes>, EmbedError> {
        if !self.blocklist.permits(url) {
            return Err(EmbedError::Blocked(url.to_string()));
        }
        let mut builder = Request::builder().method(method).uri(url.as_str());
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        Ok(builder.body(body)?)
    }

    /// `GET`s `url` and decodes the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, EmbedError> {
        let response = self
            .send(self.request(Method::GET, url, Bytes::new())?)
            .await?;
        Ok(serde_json::from_slice(response.body())?)
    }

    /// `POST`s `body` as JSON to `url` and decodes the JSON answer.
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<T, EmbedError> {
        let request = self.request(Method::POST, url, Bytes::from(body.to_string()))?;
        let response = self.send(request).await?;
        Ok(serde_json::from_slice(response.body())?)
    }

    /// Fetches `url` and accepts it only as an image.
    pub async fn fetch_media(&self, url: &Url) -> Result<Image, EmbedError> {
        let response = self
            .send(self.request(Method::GET, url, Bytes::new())?)
            .await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match content_type {
            Some(content_type) if content_type.starts_with("image/") => Ok(Image {
                bytes: response.into_body(),
                content_type,
            }),
            other => Err(EmbedError::NotAnImage(other)),
        }
    }
}

/// Provider-specific first stage: where does the media live?
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Returns candidate media URLs for `provider_id`, best first.
    async fn locate_media(
        &self,
        provider_id: &str,
        client: &MediaClient,
    ) -> Result<Vec<Url>, EmbedError>;
}

/// Parses a URL reported by a provider.
fn media_url(raw: &str) -> Result<Url, EmbedError> {
    Url::parse(raw).map_err(|_| EmbedError::MalformedUrl(raw.to_string()))
}

/// Resolves embed URLs to thumbnails.
pub struct EmbedResolver {
    client: MediaClient,
}

impl EmbedResolver {
    #[must_use]
    pub fn new(http: Arc<dyn HttpFetch>, config: &EmbedConfig) -> Self {
        Self {
            client: MediaClient::new(
                http,
                HostBlocklist::new(&config.blocked_hosts),
                config.fetch_timeout,
            ),
        }
    }

    /// Returns the thumbnail of `embed_url`, or the placeholder.
    pub async fn resolve(&self, embed_url: &str) -> ThumbnailResult {
        let target = classify(embed_url);
        let result = self.run(&target).await;

        let outcome = if result.is_ok() { "image" } else { "placeholder" };
        counter!(
            "edge_thumbnails_total",
            "provider" => target.provider.as_str(),
            "outcome" => outcome,
        )
        .increment(1);

        match result {
            Ok(image) => ThumbnailResult::Image(image),
            Err(err) => {
                debug!(provider = %target.provider, url = embed_url, error = %err, "serving placeholder");
                ThumbnailResult::Placeholder
            }
        }
    }

    async fn run(&self, target: &EmbedTarget) -> Result<Image, EmbedError> {
        let pipeline: &dyn MediaPipeline = match target.provider {
            ProviderKind::YouTube => &youtube::YouTube,
            ProviderKind::Vimeo => &vimeo::Vimeo,
            ProviderKind::Wikimedia => &wikimedia::Wikimedia,
            ProviderKind::GeoGebra => &geogebra::GeoGebra,
            ProviderKind::Unknown => return Err(EmbedError::UnknownProvider),
        };

        let candidates = pipeline
            .locate_media(&target.provider_id, &self.client)
            .await?;

        let mut last = EmbedError::NoCandidate;
        for url in candidates {
            match self.client.fetch_media(&url).await {
                Ok(image) => return Ok(image),
                Err(err) => {
                    debug!(%url, error = %err, "media candidate rejected");
                    last = err;
                }
            }
        }
        Err(last)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub(crate) fn resolver(http: Arc<dyn HttpFetch>) -> EmbedResolver {
        resolver_blocking(http, &[])
    }

    pub(crate) fn resolver_blocking(http: Arc<dyn HttpFetch>, blocked: &[&str]) -> EmbedResolver {
        let config = EmbedConfig {
            blocked_hosts: blocked.iter().map(ToString::to_string).collect(),
            fetch_timeout: Duration::from_secs(5),
        };
        EmbedResolver::new(http, &config)
    }

    /// Asserts the result is an image of `content_type` and `len` bytes.
    pub(crate) fn assert_image(result: &ThumbnailResult, content_type: &str, len: usize) {
        assert!(!result.is_placeholder(), "got placeholder");
        assert_eq!(result.content_type(), content_type);
        assert_eq!(result.content_length(), len);
    }
}
