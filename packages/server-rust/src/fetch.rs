//! Outbound HTTP.
//!
//! Every request the edge makes (upstream API, backends, media providers)
//! goes through [`HttpFetch`]. Responses are fully buffered, so the body a
//! caller receives is always its own copy and can be re-sent downstream.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName};
use http::{Request, Response};
use reqwest::redirect::{Action, Attempt, Policy};
use reqwest::Url;

/// Errors from performing an outbound request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchError::InvalidRequest(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Performs a buffered HTTP exchange.
///
/// Implementations: [`ReqwestFetcher`] (network), scripted fakes (tests).
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Sends `request` and returns the complete response.
    ///
    /// Non-2xx statuses are returned as `Ok`; only transport-level failures
    /// are errors.
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, FetchError>;
}

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Removes connection-specific headers before a message is forwarded.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(HeaderName::from_static(name));
    }
}

/// [`HttpFetch`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    /// Client for the API and the backends: redirects are returned to the
    /// caller untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn for_backends(timeout: Duration) -> Result<Self, FetchError> {
        Self::build(timeout, Policy::none())
    }

    /// Client for media providers: follows up to five redirects, but never
    /// to a URL rejected by `permit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn for_media<F>(timeout: Duration, permit: F) -> Result<Self, FetchError>
    where
        F: Fn(&Url) -> bool + Send + Sync + 'static,
    {
        let policy = Policy::custom(move |attempt: Attempt| -> Action {
            if !permit(attempt.url()) {
                attempt.stop()
            } else if attempt.previous().len() >= 5 {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        });
        Self::build(timeout, policy)
    }

    fn build(timeout: Duration, redirect: Policy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect)
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, FetchError> {
        let request = reqwest::Request::try_from(request)
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        let response = self.client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::from(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
