//! YouTube: thumbnails straight from the image CDN.

use async_trait::async_trait;
use reqwest::Url;

use super::{media_url, EmbedError, MediaClient, MediaPipeline};

const EMBED_HOSTS: [&str; 4] = [
    "youtube.com",
    "www.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Thumbnail variants, best first.
const VARIANTS: [&str; 2] = ["sddefault.jpg", "hqdefault.jpg"];

pub(super) fn provider_id(host: &str, url: &Url) -> Option<String> {
    let path = url.path();
    let id = if host == "youtu.be" {
        path.strip_prefix('/')
    } else if EMBED_HOSTS.contains(&host) {
        path.strip_prefix("/embed/")
    } else {
        return None;
    };
    Some(id.unwrap_or_default().to_string())
}

fn is_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub(super) struct YouTube;

#[async_trait]
impl MediaPipeline for YouTube {
    async fn locate_media(&self, id: &str, _client: &MediaClient) -> Result<Vec<Url>, EmbedError> {
        if !is_video_id(id) {
            return Err(EmbedError::MalformedId(id.to_string()));
        }
        VARIANTS
            .iter()
            .map(|variant| media_url(&format!("https://i.ytimg.com/vi/{id}/{variant}")))
            .collect()
    }
}
