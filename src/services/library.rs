//! External media-library client
//!
//! Talks to a Stash-compatible GraphQL endpoint. Every operation here is
//! best-effort by contract: an unreachable or confused library degrades to
//! "not found" / "no-op" so it can never block a scan or a download.
//! Connection settings are read through from the settings table each time a
//! client is built, so edits take effect on the next scan.

use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::db::SettingsRepository;

/// Fixed per-request timeout so a stalled library cannot pin a worker
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on waiting for a library-side job
pub const JOB_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Scene fields pushed to the library after a download
#[derive(Debug, Default, Clone)]
pub struct SceneUpdate {
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub details: Option<String>,
    pub performer_ids: Vec<String>,
}

pub struct LibraryClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    /// `local=remote` prefix rewrite applied before path-based calls
    path_mapping: Option<String>,
}

impl LibraryClient {
    /// Build a client from the current settings. `None` when no library URL
    /// is configured.
    pub async fn from_settings(settings: &SettingsRepository) -> Result<Option<Self>> {
        let Some(url) = settings.get("library_url").await? else {
            return Ok(None);
        };
        let api_key = settings.get("library_api_key").await?;
        let path_mapping = settings.get("library_path_mapping").await?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Some(Self {
            client,
            url,
            api_key,
            path_mapping,
        }))
    }

    /// Execute a GraphQL request. Returns None on any transport or decode
    /// failure; callers treat that as "no answer".
    async fn post(&self, query: &str, variables: Value) -> Option<Value> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(key) = &self.api_key {
            request = request.header("ApiKey", key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Library request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Library returned error status");
            return None;
        }
        match response.json::<Value>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(error = %e, "Library response was not JSON");
                None
            }
        }
    }

    /// Rewrite a local path into the library's view of it
    fn map_path(&self, path: &str) -> String {
        if let Some(mapping) = &self.path_mapping
            && let Some((local, remote)) = mapping.split_once('=')
        {
            let (local, remote) = (local.trim(), remote.trim());
            if let Some(rest) = path.strip_prefix(local) {
                return format!("{}{}", remote, rest);
            }
        }
        path.to_string()
    }

    /// Verify the library is reachable and speaks the expected schema
    pub async fn test_connection(&self) -> Result<String> {
        let body = self
            .post("{ version { version } }", json!({}))
            .await
            .ok_or_else(|| anyhow::anyhow!("Library unreachable"))?;
        let version = body["data"]["version"]["version"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Unexpected version response"))?;
        Ok(version.to_string())
    }

    /// Does the library already hold this video? The exact-URL match is
    /// authoritative; the includes-match on file paths is best-effort and
    /// tries each caller-supplied key in order.
    pub async fn check_video_exists(&self, url: &str, keys: &[&str]) -> bool {
        let by_url = r#"
        query FindSceneByUrl($url: String!) {
          findScenes(scene_filter: { url: { value: $url, modifier: EQUALS } }) {
            count
          }
        }
        "#;
        if let Some(body) = self.post(by_url, json!({ "url": url })).await
            && body["data"]["findScenes"]["count"].as_i64().unwrap_or(0) > 0
        {
            return true;
        }

        let by_path = r#"
        query FindSceneByPath($path: String!) {
          findScenes(scene_filter: { path: { value: $path, modifier: INCLUDES } }) {
            count
          }
        }
        "#;
        for key in keys.iter().filter(|k| !k.is_empty()) {
            if let Some(body) = self.post(by_path, json!({ "path": key })).await
                && body["data"]["findScenes"]["count"].as_i64().unwrap_or(0) > 0
            {
                return true;
            }
        }
        false
    }

    /// Find a scene id by filename hint. A bracketed viewkey embedded in the
    /// filename is the robust search term; the full name is the fallback.
    pub async fn find_scene_by_path(&self, path_hint: &str) -> Option<String> {
        let search_term = extract_bracketed_key(path_hint).unwrap_or(path_hint);

        let query = r#"
        query FindSceneIdByPath($path: String!) {
          findScenes(scene_filter: { path: { value: $path, modifier: INCLUDES } }) {
            scenes {
              id
              files { path }
            }
          }
        }
        "#;
        let body = self.post(query, json!({ "path": search_term })).await?;
        let scenes = body["data"]["findScenes"]["scenes"].as_array()?;

        if scenes.len() == 1 {
            return scenes[0]["id"].as_str().map(String::from);
        }
        for scene in scenes {
            let matches = scene["files"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|f| f["path"].as_str())
                .any(|p| p == path_hint || p.ends_with(path_hint) || p.contains(search_term));
            if matches {
                return scene["id"].as_str().map(String::from);
            }
        }
        None
    }

    /// Ask the library to scan a directory; returns the library's job id
    pub async fn metadata_scan(&self, path: &str) -> Option<String> {
        let mapped = self.map_path(path);
        debug!(path = %mapped, "Triggering library metadata scan");

        let query = r#"
        mutation MetadataScan($paths: [String!]) {
          metadataScan(input: { paths: $paths, scanGenerateCovers: true })
        }
        "#;
        let body = self.post(query, json!({ "paths": [mapped] })).await?;
        body["data"]["metadataScan"]
            .as_str()
            .map(String::from)
            .or_else(|| body["data"]["metadataScan"].as_i64().map(|id| id.to_string()))
    }

    /// Poll a library job until it finishes or the bound elapses. A timeout
    /// is not an error: the caller proceeds without confirmation.
    pub async fn wait_for_job(&self, job_id: &str, timeout: Duration) -> bool {
        let query = r#"
        query FindJob($id: ID!) {
          findJob(input: { id: $id }) { status }
        }
        "#;
        let deadline = tokio::time::Instant::now() + timeout;

        while tokio::time::Instant::now() < deadline {
            if let Some(body) = self.post(query, json!({ "id": job_id })).await {
                match body["data"]["findJob"]["status"].as_str() {
                    Some("FINISHED") => return true,
                    Some("FAILED") | Some("CANCELLED") => return false,
                    _ => {}
                }
            }
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
        }

        info!(job_id, "Library job wait timed out; proceeding without confirmation");
        false
    }

    /// Resolve the library's performer id by exact name
    pub async fn find_performer(&self, name: &str) -> Option<String> {
        let query = r#"
        query FindPerformerByName($name: String!) {
          findPerformers(performer_filter: { name: { value: $name, modifier: EQUALS } }) {
            performers { id name }
          }
        }
        "#;
        let body = self.post(query, json!({ "name": name })).await?;
        body["data"]["findPerformers"]["performers"]
            .as_array()?
            .first()?["id"]
            .as_str()
            .map(String::from)
    }

    /// Push scene metadata. Failure is logged by the caller and swallowed.
    pub async fn update_scene(&self, scene_id: &str, update: SceneUpdate) -> bool {
        let mut input = json!({ "id": scene_id });
        if let Some(title) = update.title {
            input["title"] = json!(title);
        }
        if let Some(url) = update.url {
            input["url"] = json!(url);
        }
        if let Some(date) = update.date {
            input["date"] = json!(date);
        }
        if let Some(details) = update.details {
            input["details"] = json!(details);
        }
        if !update.performer_ids.is_empty() {
            input["performer_ids"] = json!(update.performer_ids);
        }

        let query = r#"
        mutation SceneUpdate($input: SceneUpdateInput!) {
          sceneUpdate(input: $input) { id }
        }
        "#;
        self.post(query, json!({ "input": input })).await.is_some()
    }

    /// Kick off the library's auto-tag pass, over one mapped directory or,
    /// with no path, over the whole library.
    pub async fn auto_tag(&self, path: Option<&str>) -> bool {
        let paths = match path {
            Some(p) => json!([self.map_path(p)]),
            None => Value::Null,
        };
        debug!(paths = %paths, "Triggering library auto-tag");

        let query = r#"
        mutation MetadataAutoTag($paths: [String!], $performers: [String!], $studios: [String!], $tags: [String!]) {
          metadataAutoTag(input: { paths: $paths, performers: $performers, studios: $studios, tags: $tags })
        }
        "#;
        let variables = json!({
            "paths": paths,
            "performers": ["*"],
            "studios": ["*"],
            "tags": ["*"],
        });
        self.post(query, variables).await.is_some()
    }
}

/// Pull a `[viewkey]` out of a filename
fn extract_bracketed_key(name: &str) -> Option<&str> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\[([A-Za-z0-9_-]+)\]").expect("valid regex"));
    RE.captures(name).and_then(|c| c.get(1)).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_mapping_rewrites_prefix() {
        let client = LibraryClient {
            client: reqwest::Client::new(),
            url: "http://localhost:9999/graphql".to_string(),
            api_key: None,
            path_mapping: Some("/downloads = /data/media".to_string()),
        };
        assert_eq!(
            client.map_path("/downloads/Creator One/clip.mp4"),
            "/data/media/Creator One/clip.mp4"
        );
        assert_eq!(client.map_path("/elsewhere/clip.mp4"), "/elsewhere/clip.mp4");
    }

    #[test]
    fn bracketed_key_extraction() {
        assert_eq!(
            extract_bracketed_key("My Clip [dQw4w9WgXcQ].mp4"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_bracketed_key("no key here.mp4"), None);
    }
}
