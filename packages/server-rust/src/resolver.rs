//! Path resolver: `(instance, path)` to canonical [`PathInfo`].
//!
//! Lookups go through the [`CacheStore`] first and fall back to the upstream
//! API. Every failure (transport, status, schema, cache) degrades to `None`;
//! callers decide the safe default.

use std::sync::Arc;
use std::time::Duration;

use edgeroute_core::{CacheKey, Instance, PathInfo};
use metrics::counter;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::cache::CacheStore;

/// How long a resolved [`PathInfo`] stays in the cache.
pub const PATH_INFO_TTL: Duration = Duration::from_secs(60 * 60);

/// Paths answered without consulting the cache or the API.
const USER_PATHS: [&str; 2] = ["/user/me", "/user/public"];

/// Resolves paths of an instance to their canonical identity.
pub struct PathResolver {
    cache: Arc<dyn CacheStore>,
    api: ApiClient,
}

impl PathResolver {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>, api: ApiClient) -> Self {
        Self { cache, api }
    }

    /// Returns the canonical identity of `path` on `instance`, or `None`
    /// when it cannot be determined right now.
    ///
    /// A successful upstream answer is cached for [`PATH_INFO_TTL`]. A cached
    /// value that does not decode is ignored and overwritten.
    pub async fn resolve(&self, instance: Instance, path: &str) -> Option<PathInfo> {
        if USER_PATHS.contains(&path) {
            count_lookup("shortcut");
            return PathInfo::new("User", path).ok();
        }

        let key = CacheKey::new(&format!("/{instance}{path}"));

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match PathInfo::from_json(&cached) {
                Ok(info) => {
                    count_lookup("hit");
                    return Some(info);
                }
                Err(err) => debug!(%key, error = %err, "discarding invalid cached path info"),
            },
            Ok(None) => {}
            Err(err) => warn!(%key, error = %err, "cache read failed"),
        }

        let info = match self.api.query_uuid(instance, path).await {
            Ok(record) => match record.into_path_info(path) {
                Ok(info) => info,
                Err(err) => {
                    debug!(%instance, path, error = %err, "upstream path info rejected");
                    count_lookup("unavailable");
                    return None;
                }
            },
            Err(err) => {
                debug!(%instance, path, error = %err, "path info lookup failed");
                count_lookup("unavailable");
                return None;
            }
        };

        if let Err(err) = self.cache.put(&key, info.to_json(), PATH_INFO_TTL).await {
            warn!(%key, error = %err, "cache write failed");
        }
        count_lookup("miss");
        Some(info)
    }
}

fn count_lookup(outcome: &'static str) {
    counter!("edge_path_info_lookups_total", "outcome" => outcome).increment(1);
}
