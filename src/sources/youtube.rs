//! YouTube upload-feed adapter
//!
//! Uses the public Atom feed for a channel's uploads. The feed is a single
//! bounded page (the most recent uploads), so discovery always terminates.
//! Durations are not present in the feed; the filter engine treats missing
//! durations as zero.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{info, warn};

use super::{DiscoveredVideo, DiscoveryOutcome, ProgressSink};
use crate::db::PerformerRecord;

fn feed_url(performer: &PerformerRecord) -> String {
    match performer.kind.as_str() {
        // Legacy usernames still have a feed parameter of their own.
        "handle" => format!(
            "https://www.youtube.com/feeds/videos.xml?user={}",
            performer.id
        ),
        _ => format!(
            "https://www.youtube.com/feeds/videos.xml?channel_id={}",
            performer.id
        ),
    }
}

pub async fn discover(
    client: &reqwest::Client,
    performer: &PerformerRecord,
    progress: &dyn ProgressSink,
) -> DiscoveryOutcome {
    let url = feed_url(performer);
    progress.message(format!("Fetching upload feed for {}...", performer.name));
    info!(performer = %performer.id, url = %url, "Fetching YouTube upload feed");

    let content = match fetch_feed(client, &url).await {
        Ok(content) => content,
        Err(e) => {
            warn!(performer = %performer.id, error = %e, "YouTube feed fetch failed");
            return DiscoveryOutcome::partial(Vec::new(), e);
        }
    };

    match parse_feed(&content) {
        Ok(videos) => {
            info!(performer = %performer.id, count = videos.len(), "YouTube feed parsed");
            DiscoveryOutcome::ok(videos)
        }
        Err(e) => {
            warn!(performer = %performer.id, error = %e, "YouTube feed parse failed");
            DiscoveryOutcome::partial(Vec::new(), e)
        }
    }
}

async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to fetch upload feed")?;

    if !response.status().is_success() {
        anyhow::bail!("Upload feed returned status {}", response.status());
    }

    response.text().await.context("Failed to read feed body")
}

/// Parse the Atom feed into discovered videos
pub fn parse_feed(content: &str) -> Result<Vec<DiscoveredVideo>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut videos = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" {
                    current = Some(EntryBuilder::default());
                }
                current_tag = tag;
            }
            Ok(Event::Empty(ref e)) => {
                // <link rel="alternate" href="..."/> is self-closing
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "link"
                    && let Some(ref mut builder) = current
                    && let Some(href) = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"href")
                {
                    builder.url = Some(String::from_utf8_lossy(&href.value).to_string());
                }
            }
            Ok(Event::End(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry"
                    && let Some(builder) = current.take()
                    && let Some(video) = builder.build()
                {
                    videos.push(video);
                }
                current_tag.clear();
            }
            Ok(Event::Text(ref e)) => {
                if let Some(ref mut builder) = current {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match current_tag.as_str() {
                        "yt:videoId" => builder.video_id = Some(text),
                        "title" => builder.title = Some(text),
                        "published" => builder.published = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("Feed XML error: {:?}", e),
            _ => {}
        }
    }

    Ok(videos)
}

#[derive(Default)]
struct EntryBuilder {
    video_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    published: Option<String>,
}

impl EntryBuilder {
    fn build(self) -> Option<DiscoveredVideo> {
        let viewkey = self.video_id?;
        let title = self.title?;
        let url = self
            .url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", viewkey));
        // Feed timestamps are RFC 3339; keep the date part only.
        let published = self
            .published
            .map(|p| p.chars().take(10).collect::<String>());

        Some(DiscoveredVideo {
            title,
            url,
            viewkey,
            published,
            duration: None,
            media_ids: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_feed() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
        <feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns="http://www.w3.org/2005/Atom">
          <title>Uploads</title>
          <entry>
            <id>yt:video:dQw4w9WgXcQ</id>
            <yt:videoId>dQw4w9WgXcQ</yt:videoId>
            <title>First upload</title>
            <link rel="alternate" href="https://www.youtube.com/watch?v=dQw4w9WgXcQ"/>
            <published>2026-01-12T15:00:11+00:00</published>
          </entry>
          <entry>
            <yt:videoId>aaaaaaaaaaa</yt:videoId>
            <title>Second &amp; best upload</title>
            <link rel="alternate" href="https://www.youtube.com/watch?v=aaaaaaaaaaa"/>
            <published>2026-02-01T09:30:00+00:00</published>
          </entry>
        </feed>
        "#;

        let videos = parse_feed(content).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].viewkey, "dQw4w9WgXcQ");
        assert_eq!(videos[0].published.as_deref(), Some("2026-01-12"));
        assert_eq!(videos[1].title, "Second & best upload");
        assert!(videos[1].duration.is_none());
    }

    #[test]
    fn entry_without_video_id_is_skipped() {
        let content = r#"<feed><entry><title>broken</title></entry></feed>"#;
        assert!(parse_feed(content).unwrap().is_empty());
    }
}
