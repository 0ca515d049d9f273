//! X media-timeline adapter
//!
//! Fetches the user's media timeline through the web GraphQL endpoints and
//! extracts posts carrying video media. The response is deserialized
//! partially and typed: only the known nesting paths (timeline instructions,
//! entries, the tweet-result wrapper variants) are walked, so a layout drift
//! fails visibly in one place instead of silently during a blind tree walk.
//!
//! An authenticated session (cookie file) is required for more than the
//! public preview of a timeline; without one the adapter still terminates,
//! returning whatever the endpoint serves.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{DiscoveredVideo, DiscoveryOutcome, ProgressSink, format_duration};
use crate::db::PerformerRecord;

/// Public web-client bearer used by the GraphQL endpoints
const BEARER: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs=1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
const USER_BY_SCREEN_NAME: &str =
    "https://x.com/i/api/graphql/G3KGOASz96M-Qu0nwmGXNg/UserByScreenName";
const USER_MEDIA: &str = "https://x.com/i/api/graphql/MOLbHrtk8Ovu7DUNOLcXiA/UserMedia";

/// Pagination guard; each page carries roughly 20 posts.
const MAX_PAGES: u32 = 5;

pub async fn discover(
    client: &reqwest::Client,
    performer: &PerformerRecord,
    cookie_header: Option<&str>,
    progress: &dyn ProgressSink,
) -> DiscoveryOutcome {
    let mut videos: Vec<DiscoveredVideo> = Vec::new();

    progress.message(format!("Resolving @{}...", performer.id));
    let user_id = match resolve_user_id(client, &performer.id, cookie_header).await {
        Ok(id) => id,
        Err(e) => {
            warn!(performer = %performer.id, error = %e, "X user lookup failed");
            return DiscoveryOutcome::partial(videos, e);
        }
    };

    let mut cursor: Option<String> = None;
    for page in 1..=MAX_PAGES {
        progress.message(format!("Scanning media page {}...", page));

        let timeline =
            match fetch_media_page(client, &user_id, cursor.as_deref(), cookie_header).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(performer = %performer.id, page, error = %e, "X media page fetch failed");
                    return DiscoveryOutcome::partial(videos, e);
                }
            };

        let before = videos.len();
        let next_cursor = collect_videos(&timeline, &performer.id, &mut videos);
        debug!(performer = %performer.id, page, found = videos.len() - before, "X media page parsed");

        // No fresh posts or no continuation means the timeline is exhausted.
        if videos.len() == before || next_cursor.is_none() {
            break;
        }
        cursor = next_cursor;
    }

    info!(performer = %performer.id, count = videos.len(), "X discovery complete");
    DiscoveryOutcome::ok(videos)
}

fn csrf_from_cookies(cookie_header: Option<&str>) -> Option<String> {
    cookie_header?
        .split("; ")
        .find_map(|pair| pair.strip_prefix("ct0="))
        .map(str::to_string)
}

async fn graphql_get(
    client: &reqwest::Client,
    url: &str,
    variables: &serde_json::Value,
    cookie_header: Option<&str>,
) -> Result<serde_json::Value> {
    let mut request = client
        .get(url)
        .query(&[("variables", variables.to_string())])
        .header("Authorization", format!("Bearer {}", BEARER));

    if let Some(cookies) = cookie_header {
        request = request.header(reqwest::header::COOKIE, cookies.to_string());
        if let Some(csrf) = csrf_from_cookies(cookie_header) {
            request = request.header("x-csrf-token", csrf);
        }
    }

    let response = request.send().await.context("X endpoint unreachable")?;
    if !response.status().is_success() {
        anyhow::bail!("X endpoint returned status {}", response.status());
    }
    response.json().await.context("X response was not JSON")
}

async fn resolve_user_id(
    client: &reqwest::Client,
    screen_name: &str,
    cookie_header: Option<&str>,
) -> Result<String> {
    let variables = serde_json::json!({ "screen_name": screen_name });
    let body = graphql_get(client, USER_BY_SCREEN_NAME, &variables, cookie_header).await?;

    let lookup: UserLookupResponse =
        serde_json::from_value(body).context("Unexpected user lookup shape")?;
    lookup
        .data
        .and_then(|d| d.user)
        .and_then(|u| u.result)
        .and_then(|r| r.rest_id)
        .ok_or_else(|| anyhow::anyhow!("No rest_id for @{}", screen_name))
}

async fn fetch_media_page(
    client: &reqwest::Client,
    user_id: &str,
    cursor: Option<&str>,
    cookie_header: Option<&str>,
) -> Result<MediaTimelineResponse> {
    let mut variables = serde_json::json!({
        "userId": user_id,
        "count": 20,
        "includePromotedContent": false,
        "withClientEventToken": false,
        "withVoice": true,
    });
    if let Some(cursor) = cursor {
        variables["cursor"] = serde_json::Value::String(cursor.to_string());
    }

    let body = graphql_get(client, USER_MEDIA, &variables, cookie_header).await?;
    serde_json::from_value(body).context("Unexpected media timeline shape")
}

// ---------------------------------------------------------------------------
// Typed partial deserialization of the timeline payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<UserLookupData>,
}

#[derive(Debug, Deserialize)]
struct UserLookupData {
    user: Option<UserLookupUser>,
}

#[derive(Debug, Deserialize)]
struct UserLookupUser {
    result: Option<UserLookupResult>,
}

#[derive(Debug, Deserialize)]
struct UserLookupResult {
    rest_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaTimelineResponse {
    data: Option<TimelineData>,
}

#[derive(Debug, Deserialize)]
struct TimelineData {
    user: Option<TimelineUser>,
}

#[derive(Debug, Deserialize)]
struct TimelineUser {
    result: Option<TimelineUserResult>,
}

#[derive(Debug, Deserialize)]
struct TimelineUserResult {
    #[serde(alias = "timeline_v2")]
    timeline: Option<TimelineWrapper>,
}

#[derive(Debug, Deserialize)]
struct TimelineWrapper {
    timeline: Option<Timeline>,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    instructions: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Instruction {
    TimelineAddEntries {
        #[serde(default)]
        entries: Vec<TimelineEntry>,
    },
    TimelineAddToModule {
        #[serde(rename = "moduleItems", default)]
        module_items: Vec<ModuleItem>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    content: Option<EntryContent>,
}

#[derive(Debug, Deserialize)]
struct EntryContent {
    #[serde(rename = "itemContent")]
    item_content: Option<ItemContent>,
    /// Media timelines group posts into modules of items
    #[serde(default)]
    items: Vec<ModuleItem>,
    #[serde(rename = "cursorType")]
    cursor_type: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModuleItem {
    item: Option<ModuleItemInner>,
}

#[derive(Debug, Deserialize)]
struct ModuleItemInner {
    #[serde(rename = "itemContent")]
    item_content: Option<ItemContent>,
}

#[derive(Debug, Deserialize)]
struct ItemContent {
    tweet_results: Option<TweetResults>,
}

#[derive(Debug, Deserialize)]
struct TweetResults {
    result: Option<TweetResult>,
}

/// The wrapper union around a tweet. Only the two known variants are
/// handled; anything else (tombstones, withheld posts) is skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum TweetResult {
    Tweet(TweetData),
    TweetWithVisibilityResults { tweet: TweetData },
    #[serde(other)]
    Other,
}

impl TweetResult {
    fn tweet(&self) -> Option<&TweetData> {
        match self {
            Self::Tweet(t) => Some(t),
            Self::TweetWithVisibilityResults { tweet } => Some(tweet),
            Self::Other => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TweetData {
    legacy: Option<TweetLegacy>,
}

#[derive(Debug, Deserialize)]
struct TweetLegacy {
    id_str: Option<String>,
    full_text: Option<String>,
    /// e.g. "Wed Oct 10 20:19:24 +0000 2018"
    created_at: Option<String>,
    extended_entities: Option<ExtendedEntities>,
}

#[derive(Debug, Deserialize)]
struct ExtendedEntities {
    #[serde(default)]
    media: Vec<MediaEntity>,
}

#[derive(Debug, Deserialize)]
struct MediaEntity {
    #[serde(rename = "type")]
    kind: String,
    id_str: Option<String>,
    video_info: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    duration_millis: Option<u64>,
}

/// Pull video posts out of one timeline page. Returns the bottom cursor for
/// the next page when present.
pub fn collect_videos(
    response: &MediaTimelineResponse,
    username: &str,
    out: &mut Vec<DiscoveredVideo>,
) -> Option<String> {
    let mut next_cursor = None;

    let instructions = response
        .data
        .as_ref()
        .and_then(|d| d.user.as_ref())
        .and_then(|u| u.result.as_ref())
        .and_then(|r| r.timeline.as_ref())
        .and_then(|w| w.timeline.as_ref())
        .map(|t| t.instructions.as_slice())
        .unwrap_or_default();

    for instruction in instructions {
        match instruction {
            Instruction::TimelineAddEntries { entries } => {
                for entry in entries {
                    let Some(content) = &entry.content else {
                        continue;
                    };
                    if content.cursor_type.as_deref() == Some("Bottom") {
                        next_cursor = content.value.clone();
                    }
                    if let Some(item) = &content.item_content {
                        push_tweet_videos(item, username, out);
                    }
                    for module_item in &content.items {
                        if let Some(item) =
                            module_item.item.as_ref().and_then(|i| i.item_content.as_ref())
                        {
                            push_tweet_videos(item, username, out);
                        }
                    }
                }
            }
            Instruction::TimelineAddToModule { module_items } => {
                for module_item in module_items {
                    if let Some(item) =
                        module_item.item.as_ref().and_then(|i| i.item_content.as_ref())
                    {
                        push_tweet_videos(item, username, out);
                    }
                }
            }
            Instruction::Other => {}
        }
    }

    next_cursor
}

fn push_tweet_videos(item: &ItemContent, username: &str, out: &mut Vec<DiscoveredVideo>) {
    let Some(legacy) = item
        .tweet_results
        .as_ref()
        .and_then(|r| r.result.as_ref())
        .and_then(|r| r.tweet())
        .and_then(|t| t.legacy.as_ref())
    else {
        return;
    };

    let media_ids: Vec<String> = legacy
        .extended_entities
        .as_ref()
        .map(|e| {
            e.media
                .iter()
                .filter(|m| m.kind == "video")
                .filter_map(|m| m.id_str.clone())
                .collect()
        })
        .unwrap_or_default();

    let has_video = legacy
        .extended_entities
        .as_ref()
        .is_some_and(|e| e.media.iter().any(|m| m.kind == "video"));
    if !has_video {
        return;
    }

    let Some(tweet_id) = legacy.id_str.clone() else {
        return;
    };
    // Dedup within the page set; the same post can appear in both the entry
    // list and a module.
    if out.iter().any(|v| v.viewkey == tweet_id) {
        return;
    }

    let duration = legacy
        .extended_entities
        .as_ref()
        .and_then(|e| e.media.iter().find(|m| m.kind == "video"))
        .and_then(|m| m.video_info.as_ref())
        .and_then(|v| v.duration_millis)
        .map(|ms| format_duration(ms / 1000));

    let published = legacy.created_at.as_deref().and_then(parse_created_at);

    out.push(DiscoveredVideo {
        title: legacy
            .full_text
            .clone()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string(),
        url: format!("https://x.com/{}/status/{}", username, tweet_id),
        viewkey: tweet_id,
        published,
        duration,
        media_ids,
    });
}

/// "Wed Oct 10 20:19:24 +0000 2018" → "2018-10-10"
fn parse_created_at(s: &str) -> Option<String> {
    chrono::DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline_json(result: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "data": { "user": { "result": { "timeline_v2": { "timeline": {
                "instructions": [
                    { "type": "TimelineClearCache" },
                    { "type": "TimelineAddEntries", "entries": [
                        { "content": { "itemContent": { "tweet_results": { "result": result } } } },
                        { "content": { "cursorType": "Bottom", "value": "cursor-xyz" } }
                    ]}
                ]
            }}}}}
        })
    }

    fn video_tweet(id: &str) -> serde_json::Value {
        serde_json::json!({
            "__typename": "Tweet",
            "legacy": {
                "id_str": id,
                "full_text": "clip day\nsecond line",
                "created_at": "Wed Oct 10 20:19:24 +0000 2018",
                "extended_entities": { "media": [
                    { "type": "photo", "id_str": "p1" },
                    { "type": "video", "id_str": "m1",
                      "video_info": { "duration_millis": 95000 } }
                ]}
            }
        })
    }

    #[test]
    fn extracts_video_posts() {
        let response: MediaTimelineResponse =
            serde_json::from_value(timeline_json(video_tweet("111"))).unwrap();

        let mut videos = Vec::new();
        let cursor = collect_videos(&response, "creator", &mut videos);

        assert_eq!(cursor.as_deref(), Some("cursor-xyz"));
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].viewkey, "111");
        assert_eq!(videos[0].url, "https://x.com/creator/status/111");
        assert_eq!(videos[0].title, "clip day");
        assert_eq!(videos[0].published.as_deref(), Some("2018-10-10"));
        assert_eq!(videos[0].duration.as_deref(), Some("1:35"));
        assert_eq!(videos[0].media_ids, vec!["m1".to_string()]);
    }

    #[test]
    fn visibility_wrapper_is_unwrapped() {
        let response: MediaTimelineResponse = serde_json::from_value(timeline_json(
            serde_json::json!({
                "__typename": "TweetWithVisibilityResults",
                "tweet": { "legacy": video_tweet("222")["legacy"].clone() }
            }),
        ))
        .unwrap();

        let mut videos = Vec::new();
        collect_videos(&response, "creator", &mut videos);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].viewkey, "222");
    }

    #[test]
    fn photo_only_and_tombstone_posts_are_skipped() {
        let photo_only = serde_json::json!({
            "__typename": "Tweet",
            "legacy": {
                "id_str": "333",
                "full_text": "just a photo",
                "extended_entities": { "media": [ { "type": "photo", "id_str": "p2" } ] }
            }
        });
        let response: MediaTimelineResponse =
            serde_json::from_value(timeline_json(photo_only)).unwrap();
        let mut videos = Vec::new();
        collect_videos(&response, "creator", &mut videos);
        assert!(videos.is_empty());

        let tombstone = serde_json::json!({ "__typename": "TweetTombstone" });
        let response: MediaTimelineResponse =
            serde_json::from_value(timeline_json(tombstone)).unwrap();
        let mut videos = Vec::new();
        collect_videos(&response, "creator", &mut videos);
        assert!(videos.is_empty());
    }
}
