//! GeoGebra: material API lookup of the applet's preview image.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use super::{media_url, EmbedError, MediaClient, MediaPipeline};

const HOSTS: [&str; 2] = ["geogebra.org", "www.geogebra.org"];
const API_ENDPOINT: &str = "https://www.geogebra.org/api/json.php";

pub(super) fn provider_id(host: &str, url: &Url) -> Option<String> {
    HOSTS.contains(&host).then(|| {
        url.path()
            .strip_prefix("/material/iframe/id/")
            .unwrap_or_default()
            .to_string()
    })
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    responses: Responses,
}

#[derive(Debug, Deserialize)]
struct Responses {
    response: MaterialResponse,
}

#[derive(Debug, Deserialize)]
struct MaterialResponse {
    item: Material,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Material {
    preview_url: String,
}

fn preview_query(id: &str) -> serde_json::Value {
    json!({
        "request": {
            "-api": "1.0.0",
            "task": {
                "-type": "fetch",
                "fields": { "field": [{ "-name": "preview_url" }] },
                "filters": { "field": [{ "-name": "id", "#text": id }] },
                "limit": { "-num": "1" },
            },
        },
    })
}

pub(super) struct GeoGebra;

#[async_trait]
impl MediaPipeline for GeoGebra {
    async fn locate_media(&self, id: &str, client: &MediaClient) -> Result<Vec<Url>, EmbedError> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EmbedError::MalformedId(id.to_string()));
        }

        let endpoint = media_url(API_ENDPOINT)?;
        let response: ApiResponse = client.post_json(&endpoint, &preview_query(id)).await?;
        Ok(vec![media_url(&response.responses.response.item.preview_url)?])
    }
}
