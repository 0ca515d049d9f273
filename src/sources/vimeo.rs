//! Vimeo listing adapter
//!
//! Uses the unauthenticated Simple API, which serves 20 clips per page and
//! caps out at page 3. Pagination is therefore bounded by the API itself.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::{DiscoveredVideo, DiscoveryOutcome, ProgressSink, format_duration};
use crate::db::PerformerRecord;

/// The Simple API refuses pages beyond 3.
const MAX_PAGES: u32 = 3;

/// One clip as returned by the Simple API
#[derive(Debug, Deserialize)]
struct VimeoClip {
    id: u64,
    title: String,
    url: String,
    upload_date: Option<String>,
    /// Seconds
    duration: Option<u64>,
}

fn page_url(performer: &PerformerRecord, page: u32) -> String {
    match performer.kind.as_str() {
        "channel" => format!(
            "https://vimeo.com/api/v2/channel/{}/videos.json?page={}",
            performer.id, page
        ),
        _ => format!(
            "https://vimeo.com/api/v2/{}/videos.json?page={}",
            performer.id, page
        ),
    }
}

pub async fn discover(
    client: &reqwest::Client,
    performer: &PerformerRecord,
    progress: &dyn ProgressSink,
) -> DiscoveryOutcome {
    let mut videos = Vec::new();

    for page in 1..=MAX_PAGES {
        progress.message(format!("Scanning page {}...", page));
        let url = page_url(performer, page);
        info!(performer = %performer.id, url = %url, "Fetching Vimeo listing page");

        let clips = match fetch_page(client, &url).await {
            Ok(clips) => clips,
            Err(e) => {
                warn!(performer = %performer.id, page, error = %e, "Vimeo page fetch failed");
                // Keep what earlier pages produced.
                return DiscoveryOutcome::partial(videos, e);
            }
        };

        if clips.is_empty() {
            break;
        }

        videos.extend(clips.into_iter().map(|clip| DiscoveredVideo {
            viewkey: clip.id.to_string(),
            title: clip.title,
            url: clip.url,
            published: clip
                .upload_date
                .map(|d| d.chars().take(10).collect::<String>()),
            duration: clip.duration.map(format_duration),
            media_ids: Vec::new(),
        }));
    }

    info!(performer = %performer.id, count = videos.len(), "Vimeo discovery complete");
    DiscoveryOutcome::ok(videos)
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<Vec<VimeoClip>> {
    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to fetch Vimeo listing")?;

    // An empty page comes back as 404 once the listing is exhausted.
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(Vec::new());
    }
    if !response.status().is_success() {
        anyhow::bail!("Vimeo listing returned status {}", response.status());
    }

    response
        .json::<Vec<VimeoClip>>()
        .await
        .context("Failed to decode Vimeo listing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_clip_payload() {
        let body = r#"[
            {"id": 76979871, "title": "A clip", "url": "https://vimeo.com/76979871",
             "upload_date": "2026-03-01 12:00:00", "duration": 605},
            {"id": 76979872, "title": "Another", "url": "https://vimeo.com/76979872"}
        ]"#;
        let clips: Vec<VimeoClip> = serde_json::from_str(body).unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].duration, Some(605));
        assert!(clips[1].upload_date.is_none());
    }
}
