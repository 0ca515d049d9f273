//! Session cookie loading for authenticated discovery
//!
//! Accepts either a Netscape `cookies.txt` export or a JSON array of
//! `{name, value, ...}` objects and flattens it into a single `Cookie`
//! request header.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JsonCookie {
    name: String,
    value: String,
}

/// Read the cookie file and build a `Cookie` header value.
pub fn load_cookie_header(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cookie file {}", path.display()))?;
    let pairs = parse_cookies(&content);
    if pairs.is_empty() {
        anyhow::bail!("No cookies found in {}", path.display());
    }
    Ok(pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; "))
}

/// Parse name/value pairs from JSON or Netscape format
pub fn parse_cookies(content: &str) -> Vec<(String, String)> {
    // JSON export takes priority; fall back to Netscape lines.
    if let Ok(json_cookies) = serde_json::from_str::<Vec<JsonCookie>>(content) {
        return json_cookies
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
    }

    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        // Netscape format: domain, flag, path, secure, expiry, name, value
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() >= 7 {
            pairs.push((fields[5].to_string(), fields[6].trim().to_string()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_netscape_lines() {
        let content = "# Netscape HTTP Cookie File\n\
            .x.com\tTRUE\t/\tTRUE\t1999999999\tauth_token\tabc123\n\
            #HttpOnly_.x.com\tTRUE\t/\tTRUE\t1999999999\tct0\tdef456\n";
        let pairs = parse_cookies(content);
        assert_eq!(
            pairs,
            vec![
                ("auth_token".to_string(), "abc123".to_string()),
                ("ct0".to_string(), "def456".to_string()),
            ]
        );
    }

    #[test]
    fn parses_json_export() {
        let content = r#"[{"name":"auth_token","value":"abc123","domain":".x.com"}]"#;
        let pairs = parse_cookies(content);
        assert_eq!(pairs, vec![("auth_token".to_string(), "abc123".to_string())]);
    }

    #[test]
    fn ignores_comments_and_short_lines() {
        assert!(parse_cookies("# just a comment\nnot-a-cookie-line\n").is_empty());
    }
}
