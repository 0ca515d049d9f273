//! Existence checks against the local download tree and the external library
//!
//! Both checks are independently toggleable. The fold is deliberately
//! lenient: a video exists iff ANY enabled check found it, and a disabled
//! check contributes nothing. When every check is disabled the oracle
//! answers with `Unknown` so callers never revert state on missing evidence.

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::services::library::LibraryClient;

/// Answer of a full existence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Present,
    Absent,
    /// No check was enabled; absence of evidence, not evidence of absence
    Unknown,
}

/// Filename snapshot of one performer's download directory, built once per
/// scan so repeated probes stay cheap.
pub struct LocalIndex {
    file_names: Vec<String>,
}

impl LocalIndex {
    pub fn build(dir: &Path) -> Self {
        let mut file_names = Vec::new();
        if dir.is_dir() {
            for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file()
                    && let Some(name) = entry.file_name().to_str()
                {
                    file_names.push(name.to_string());
                }
            }
        }
        debug!(dir = %dir.display(), files = file_names.len(), "Indexed local downloads");
        Self { file_names }
    }

    #[cfg(test)]
    pub fn from_names(names: Vec<String>) -> Self {
        Self { file_names: names }
    }

    /// Present locally iff some filename contains the key as a substring.
    /// Keys are viewkeys or alternate media ids; they are long enough that
    /// substring matching is acceptable.
    pub fn contains_key(&self, key: &str) -> bool {
        !key.is_empty() && self.file_names.iter().any(|n| n.contains(key))
    }
}

/// One video's identifying keys, in probe order
#[derive(Debug, Clone)]
pub struct ExistenceKeys<'a> {
    pub url: &'a str,
    pub viewkey: &'a str,
    pub media_ids: &'a [String],
    pub title: &'a str,
}

impl ExistenceKeys<'_> {
    fn local_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.viewkey)
            .chain(self.media_ids.iter().map(String::as_str))
            .filter(|k| !k.is_empty())
    }

    /// Keys used against the library. The title is consulted only when the
    /// video carries no identifiers at all; common-word titles
    /// substring-match library paths far too easily to use them otherwise.
    fn remote_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.local_keys().collect();
        if keys.is_empty() && !self.title.is_empty() {
            keys.push(self.title);
        }
        keys
    }
}

pub struct ExistenceOracle {
    local: Option<LocalIndex>,
    library: Option<LibraryClient>,
}

impl ExistenceOracle {
    pub fn new(local: Option<LocalIndex>, library: Option<LibraryClient>) -> Self {
        Self { local, library }
    }

    pub fn any_check_enabled(&self) -> bool {
        self.local.is_some() || self.library.is_some()
    }

    pub async fn probe(&self, keys: &ExistenceKeys<'_>) -> Existence {
        if !self.any_check_enabled() {
            return Existence::Unknown;
        }

        if let Some(local) = &self.local
            && keys.local_keys().any(|k| local.contains_key(k))
        {
            return Existence::Present;
        }

        if let Some(library) = &self.library
            && library
                .check_video_exists(keys.url, &keys.remote_keys())
                .await
        {
            return Existence::Present;
        }

        Existence::Absent
    }
}

/// Build a local index for a performer, or None when the directory is not
/// configured or does not exist yet.
pub fn local_index_for(download_dir: Option<&Path>) -> Option<LocalIndex> {
    match download_dir {
        Some(dir) if dir.is_dir() => Some(LocalIndex::build(dir)),
        Some(dir) => {
            warn!(dir = %dir.display(), "Download directory missing; skipping local check");
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn local_index_matches_by_substring() {
        let index = LocalIndex::from_names(vec![
            "Ana - Studio Session [abc123].mp4".to_string(),
            "clip.mp4".to_string(),
        ]);
        assert!(index.contains_key("abc123"));
        assert!(!index.contains_key("zzz999"));
        assert!(!index.contains_key(""));
    }

    #[test]
    fn local_index_walks_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("2024");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("Show [key777].mp4"), b"x").unwrap();

        let index = LocalIndex::build(tmp.path());
        assert!(index.contains_key("key777"));
    }

    #[test]
    fn title_is_not_a_remote_key_when_identifiers_exist() {
        let keys = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "vk42",
            media_ids: &["9000123".to_string()],
            title: "Cool Title",
        };
        assert_eq!(keys.remote_keys(), vec!["vk42", "9000123"]);
    }

    #[test]
    fn title_is_the_remote_fallback_for_identifierless_videos() {
        let keys = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "",
            media_ids: &[],
            title: "Cool Title",
        };
        assert_eq!(keys.remote_keys(), vec!["Cool Title"]);

        let nothing = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "",
            media_ids: &[],
            title: "",
        };
        assert!(nothing.remote_keys().is_empty());
    }

    #[tokio::test]
    async fn all_checks_disabled_yields_unknown() {
        let oracle = ExistenceOracle::new(None, None);
        let keys = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "abc",
            media_ids: &[],
            title: "Title",
        };
        assert_eq!(oracle.probe(&keys).await, Existence::Unknown);
    }

    #[tokio::test]
    async fn local_hit_short_circuits() {
        let index = LocalIndex::from_names(vec!["Saved [vk42].mp4".to_string()]);
        let oracle = ExistenceOracle::new(Some(index), None);
        let keys = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "vk42",
            media_ids: &[],
            title: "Saved",
        };
        assert_eq!(oracle.probe(&keys).await, Existence::Present);
    }

    #[tokio::test]
    async fn media_ids_count_as_local_keys() {
        let index = LocalIndex::from_names(vec!["post [9000123].mp4".to_string()]);
        let oracle = ExistenceOracle::new(Some(index), None);
        let keys = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "tweet1",
            media_ids: &["9000123".to_string()],
            title: "post",
        };
        assert_eq!(oracle.probe(&keys).await, Existence::Present);
    }

    #[tokio::test]
    async fn enabled_check_with_no_hit_is_absent() {
        let index = LocalIndex::from_names(vec!["other.mp4".to_string()]);
        let oracle = ExistenceOracle::new(Some(index), None);
        let keys = ExistenceKeys {
            url: "https://example.com/v",
            viewkey: "vk42",
            media_ids: &[],
            title: "Missing",
        };
        assert_eq!(oracle.probe(&keys).await, Existence::Absent);
    }
}
