//! Client for the upstream GraphQL API.

use std::sync::Arc;

use bytes::Bytes;
use edgeroute_core::schema::{decode_uuid_response, SchemaError, UuidRecord, PATH_INFO_QUERY};
use edgeroute_core::Instance;
use http::{header, Method, Request, StatusCode};
use serde_json::json;

use crate::fetch::{FetchError, HttpFetch};

/// Why a query to the upstream API produced no usable result.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("upstream api answered with status {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("could not build api request: {0}")]
    Request(#[from] http::Error),
}

/// Issues `uuid` queries against the upstream API.
pub struct ApiClient {
    endpoint: String,
    http: Arc<dyn HttpFetch>,
}

impl ApiClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, http: Arc<dyn HttpFetch>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    /// Looks up the resource at `path` of `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, a non-2xx status, or a
    /// body that does not match the documented response shape.
    pub async fn query_uuid(&self, instance: Instance, path: &str) -> Result<UuidRecord, ApiError> {
        let body = json!({
            "query": PATH_INFO_QUERY,
            "variables": { "alias": { "instance": instance, "path": path } },
        });

        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))?;

        let response = self.http.send(request).await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        Ok(decode_uuid_response(response.body())?)
    }
}
