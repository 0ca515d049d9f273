//! Telegram notifications for scheduled-scan summaries
//!
//! Silent unless both the bot token and the chat id are configured; delivery
//! failures are logged and never affect the operation that triggered them.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::{debug, warn};

use crate::db::SettingsRepository;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Send an HTML-formatted message to the configured chat. Returns whether a
/// message was actually sent (false when unconfigured).
pub async fn send_message(settings: &SettingsRepository, text: &str) -> Result<bool> {
    let (Some(token), Some(chat_id)) = (
        settings.get("telegram_token").await?,
        settings.get("telegram_chat_id").await?,
    ) else {
        debug!("Telegram not configured; skipping notification");
        return Ok(false);
    };

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
    let response = client
        .post(&url)
        .json(&json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body, "Telegram rejected the notification");
        return Ok(false);
    }
    Ok(true)
}

/// Best-effort wrapper: log and swallow any failure
pub async fn notify(settings: &SettingsRepository, text: &str) {
    if let Err(e) = send_message(settings, text).await {
        warn!(error = %e, "Failed to send Telegram notification");
    }
}
