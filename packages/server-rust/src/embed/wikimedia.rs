//! Wikimedia Commons: the thumbnail path is derived from the file path.

use async_trait::async_trait;
use reqwest::Url;

use super::{media_url, EmbedError, MediaClient, MediaPipeline};

const HOST: &str = "upload.wikimedia.org";
const COMMONS: &str = "/wikipedia/commons/";
const THUMBNAIL_WIDTH: u32 = 800;

/// Returns `<h>/<hh>/<file>` for files under the commons tree.
pub(super) fn provider_id(host: &str, url: &Url) -> Option<String> {
    (host == HOST).then(|| url.path().strip_prefix(COMMONS).unwrap_or_default().to_string())
}

/// Splits `<h>/<hh>/<file>` into its parts.
fn split_id(id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = id.splitn(3, '/');
    let (h, hh, file) = (parts.next()?, parts.next()?, parts.next()?);
    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());

    let valid = h.len() == 1
        && hh.len() == 2
        && is_hex(h)
        && is_hex(hh)
        && !file.is_empty()
        && !file.contains('/');
    valid.then_some((h, hh, file))
}

pub(super) struct Wikimedia;

#[async_trait]
impl MediaPipeline for Wikimedia {
    async fn locate_media(&self, id: &str, _client: &MediaClient) -> Result<Vec<Url>, EmbedError> {
        let (h, hh, file) = split_id(id).ok_or_else(|| EmbedError::MalformedId(id.to_string()))?;
        let thumbnail = format!(
            "https://{HOST}{COMMONS}thumb/{h}/{hh}/{file}/{THUMBNAIL_WIDTH}px--{file}.jpg"
        );
        Ok(vec![media_url(&thumbnail)?])
    }
}
