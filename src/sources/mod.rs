//! Platform source adapters
//!
//! Each supported platform has an adapter that turns a performer identity
//! into a finite listing of discovered videos. The platform set is small and
//! fixed, so dispatch is a single match over a closed enum rather than any
//! plugin mechanism.

pub mod cookies;
pub mod vimeo;
pub mod x;
pub mod youtube;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::PerformerRecord;

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Youtube,
    Vimeo,
    X,
}

#[derive(Debug, Error)]
#[error("unknown site '{0}'")]
pub struct UnknownSite(String);

impl Site {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Vimeo => "vimeo",
            Self::X => "x",
        }
    }

    /// Public profile URL for a performer on this site
    pub fn profile_url(self, id: &str, kind: &str) -> String {
        match self {
            Self::Youtube => match kind {
                "handle" => format!("https://www.youtube.com/@{}", id),
                _ => format!("https://www.youtube.com/channel/{}", id),
            },
            Self::Vimeo => match kind {
                "channel" => format!("https://vimeo.com/channels/{}", id),
                _ => format!("https://vimeo.com/{}", id),
            },
            Self::X => format!("https://x.com/{}", id),
        }
    }
}

impl std::str::FromStr for Site {
    type Err = UnknownSite;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" => Ok(Self::Youtube),
            "vimeo" => Ok(Self::Vimeo),
            "x" => Ok(Self::X),
            other => Err(UnknownSite(other.to_string())),
        }
    }
}

/// One video as reported by a platform listing
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredVideo {
    pub title: String,
    pub url: String,
    /// Platform-scoped unique key, the dedup and existence-search key
    pub viewkey: String,
    pub published: Option<String>,
    pub duration: Option<String>,
    /// Alternate identifiers (e.g. per-media ids in a multi-video post)
    pub media_ids: Vec<String>,
}

/// Result of one discovery pass. Adapters keep whatever they collected
/// before a failure so partial pages still feed reconciliation.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub videos: Vec<DiscoveredVideo>,
    pub error: Option<String>,
}

impl DiscoveryOutcome {
    pub fn ok(videos: Vec<DiscoveredVideo>) -> Self {
        Self {
            videos,
            error: None,
        }
    }

    pub fn partial(videos: Vec<DiscoveredVideo>, error: impl std::fmt::Display) -> Self {
        Self {
            videos,
            error: Some(error.to_string()),
        }
    }
}

/// Render a duration in seconds as the `H:MM:SS` / `M:SS` form the filter
/// engine parses.
pub fn format_duration(total_seconds: u64) -> String {
    let (minutes, seconds) = (total_seconds / 60, total_seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Incremental status reporting during a long-running discovery
pub trait ProgressSink: Send + Sync {
    fn message(&self, text: String);

    /// Percent-plus-message update; sinks without a progress bar ignore it
    fn progress(&self, _pct: u8, _text: String) {}

    /// Transfer counters, reported by downloads
    fn bytes(&self, _done: u64, _total: Option<u64>) {}
}

/// Sink that discards all progress
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn message(&self, _text: String) {}
}

/// A platform adapter: performer identity in, finite video listing out
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn discover(
        &self,
        performer: &PerformerRecord,
        progress: &dyn ProgressSink,
    ) -> DiscoveryOutcome;
}

/// The production dispatcher over the closed platform set
pub struct SourceDispatch {
    client: reqwest::Client,
    cookies_path: PathBuf,
}

impl SourceDispatch {
    pub fn new(cookies_path: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("followarr/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            cookies_path,
        }
    }

    /// Cookie header for authenticated sessions, when enabled and readable
    fn auth_cookies(&self, performer: &PerformerRecord) -> Option<String> {
        if !performer.use_auth_session {
            return None;
        }
        match cookies::load_cookie_header(&self.cookies_path) {
            Ok(header) => Some(header),
            Err(e) => {
                tracing::warn!(
                    performer = %performer.id,
                    path = %self.cookies_path.display(),
                    error = %e,
                    "Auth session requested but cookie file unusable"
                );
                None
            }
        }
    }
}

#[async_trait]
impl VideoSource for SourceDispatch {
    async fn discover(
        &self,
        performer: &PerformerRecord,
        progress: &dyn ProgressSink,
    ) -> DiscoveryOutcome {
        let cookie_header = self.auth_cookies(performer);
        match performer.site {
            Site::Youtube => {
                youtube::discover(&self.client, performer, progress).await
            }
            Site::Vimeo => vimeo::discover(&self.client, performer, progress).await,
            Site::X => {
                x::discover(&self.client, performer, cookie_header.as_deref(), progress).await
            }
        }
    }
}
