//! One-shot insights fetch and the text served by the tools.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{InstagramApi, MediaFeedQuery};
use crate::error::ClientError;

pub const DEFAULT_MAX_MEDIAS: usize = 10;
pub const MEDIA_SEPARATOR: &str = "\n---\n";

/// Reports fetched at startup. Immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct InsightsSnapshot {
    pub account: Value,
    pub media: Vec<Value>,
    pub fetched_at: DateTime<Utc>,
}

impl InsightsSnapshot {
    pub fn new(account: Value, media: Vec<Value>) -> Self {
        Self {
            account,
            media,
            fetched_at: Utc::now(),
        }
    }

    pub fn account_text(&self) -> String {
        format_account(&self.account)
    }

    pub fn media_text(&self, max_medias: usize) -> String {
        format_media(&self.media, max_medias)
    }
}

pub fn format_account(account: &Value) -> String {
    account.to_string()
}

/// First `max_medias` posts, one JSON document each, separated by `---` lines.
pub fn format_media(media: &[Value], max_medias: usize) -> String {
    media
        .iter()
        .take(max_medias)
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(MEDIA_SEPARATOR)
}

pub async fn fetch_snapshot<C: InstagramApi + ?Sized>(
    client: &C,
    query: &MediaFeedQuery,
) -> Result<InsightsSnapshot, ClientError> {
    let account = client.insights_account().await?;
    let media = client.insights_media_feed_all(query).await?;
    info!(
        media = media.len(),
        time_frame = %query.time_frame,
        ordering = %query.data_ordering,
        "Fetched account and media insights"
    );
    Ok(InsightsSnapshot::new(account, media))
}

/// Fetches both reports, then logs out. A failed logout is only logged since
/// the data is already in hand.
pub async fn fetch_and_logout<C: InstagramApi>(
    mut client: C,
    query: &MediaFeedQuery,
) -> Result<InsightsSnapshot, ClientError> {
    let snapshot = fetch_snapshot(&client, query).await;
    if let Err(e) = client.logout().await {
        warn!(error = %e, "Logout after insights fetch failed");
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn media_is_capped_and_separated() {
        let media: Vec<Value> = (0..12).map(|i| json!({ "reach_count": i })).collect();
        let text = format_media(&media, DEFAULT_MAX_MEDIAS);
        let parts: Vec<&str> = text.split(MEDIA_SEPARATOR).collect();
        assert_eq!(parts.len(), 10);
        assert_eq!(parts[0], r#"{"reach_count":0}"#);
        assert_eq!(parts[9], r#"{"reach_count":9}"#);
    }

    #[test]
    fn empty_media_renders_empty_text() {
        assert_eq!(format_media(&[], DEFAULT_MAX_MEDIAS), "");
    }

    #[test]
    fn account_is_rendered_as_json() {
        let account = json!({ "followers_unit": { "followers_count": 120 } });
        let text = format_account(&account);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, account);
    }
}
