use anyhow::Context;
use bytes::Bytes;
use http::Method;
use http::header::{ACCEPT, CACHE_CONTROL};
use http_body_util::Empty;
use realtime::{HttpRequest, Result, bad_gateway, invalid_format};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::feed::{PullEntity, RawUpdate};

#[derive(Deserialize)]
#[serde(untagged)]
enum PullFeed {
    Entities(Vec<Value>),
    Envelope { response: PullResponse },
}

#[derive(Deserialize)]
struct PullResponse {
    #[serde(default)]
    entity: Vec<Value>,
}

/// Fetches the pull feed and decodes its entities.
///
/// Entities that fail shape validation are logged and skipped.
///
/// # Errors
///
/// Returns an error when the request fails, the feed responds with a
/// non-success status, or the body is not a list of entities.
pub async fn fetch<P: HttpRequest>(provider: &P, url: &str) -> Result<Vec<RawUpdate>> {
    let request = http::Request::builder()
        .method(Method::GET)
        .uri(url)
        .header(ACCEPT, "application/json")
        .header(CACHE_CONTROL, "no-cache")
        .body(Empty::<Bytes>::new())
        .context("building pull feed request")?;

    let response = HttpRequest::fetch(provider, request).await.context("pull feed request failed")?;
    let status = response.status();
    if !status.is_success() {
        return Err(bad_gateway!("pull feed responded with {status}"));
    }

    let body = response.into_body();
    let feed: PullFeed =
        serde_json::from_slice(&body).map_err(|e| invalid_format!("pull feed: {e}"))?;
    let entities = match feed {
        PullFeed::Entities(entities) => entities,
        PullFeed::Envelope { response } => response.entity,
    };

    let total = entities.len();
    let updates = entities
        .into_iter()
        .filter_map(|entity| match serde_json::from_value::<PullEntity>(entity) {
            Ok(entity) => Some(RawUpdate::Pull(entity)),
            Err(e) => {
                warn!(monotonic_counter.malformed_pull_entity = 1, "skipping pull entity: {e}");
                None
            }
        })
        .collect::<Vec<_>>();

    debug!(total, decoded = updates.len(), "fetched pull feed");
    Ok(updates)
}
