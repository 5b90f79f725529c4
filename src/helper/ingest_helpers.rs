use crate::config::Config;
use crate::helper::slug_helpers;
use crate::models::db_operations::profiles_db_operations;
use crate::models::{Category, NewContentPost, SectionType};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Reserved image-asset location key for the stock announcement image.
pub const ANNOUNCEMENT_IMAGE_KEY: &str = "announcement-default";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Request body is not valid UTF-8")]
    Utf8,
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("Failed to read request body: {0}")]
    Body(String),
}

/// What every wire shape is reduced to before the pipeline proper runs.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundDelivery {
    pub subject: Option<String>,
    pub plain: String,
    pub html: String,
    pub date: DateTime<Utc>,
    pub message_id: Option<String>,
}

fn parse_delivery_date(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Pulls a header value out of a raw RFC 822 header block, e.g. the
/// `headers` field some relays forward verbatim.
fn header_from_raw_block(raw: &str, name: &str) -> Option<String> {
    let prefix = format!("{}:", name.to_lowercase());
    raw.lines()
        .find(|line| line.to_lowercase().starts_with(&prefix))
        .map(|line| line[prefix.len()..].trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// JSON wire shape. The direct `subject` field wins over the nested
/// `headers.subject` location; both may be absent.
pub fn parse_json_delivery(body: &[u8], now: DateTime<Utc>) -> Result<InboundDelivery, IngestError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;

    let subject = non_empty(value["subject"].as_str())
        .or_else(|| non_empty(value["headers"]["subject"].as_str()));
    let plain = non_empty(value["plain"].as_str())
        .or_else(|| non_empty(value["text"].as_str()))
        .unwrap_or_default();
    let html = non_empty(value["html"].as_str()).unwrap_or_default();
    let date = value["date"]
        .as_str()
        .map(|raw| parse_delivery_date(raw, now))
        .unwrap_or(now);
    let message_id = non_empty(value["message_id"].as_str())
        .or_else(|| non_empty(value["headers"]["message-id"].as_str()));

    Ok(InboundDelivery {
        subject,
        plain,
        html,
        date,
        message_id,
    })
}

/// Flat field map from the multipart and URL-encoded shapes. The nested
/// subject location here is a raw header block in the `headers` field.
pub fn delivery_from_fields(fields: &HashMap<String, String>, now: DateTime<Utc>) -> InboundDelivery {
    let raw_headers = fields.get("headers").map(String::as_str).unwrap_or("");

    let subject = non_empty(fields.get("subject").map(String::as_str))
        .or_else(|| header_from_raw_block(raw_headers, "subject"));
    let plain = non_empty(fields.get("plain").map(String::as_str))
        .or_else(|| non_empty(fields.get("text").map(String::as_str)))
        .unwrap_or_default();
    let html = non_empty(fields.get("html").map(String::as_str)).unwrap_or_default();
    let date = fields
        .get("date")
        .map(|raw| parse_delivery_date(raw, now))
        .unwrap_or(now);
    let message_id = non_empty(fields.get("message_id").map(String::as_str))
        .or_else(|| header_from_raw_block(raw_headers, "message-id"));

    InboundDelivery {
        subject,
        plain,
        html,
        date,
        message_id,
    }
}

/// Inbound mail is not always well-formed; a missing subject becomes a
/// dated placeholder instead of a rejected delivery.
pub fn subject_or_fallback(subject: Option<String>, now: DateTime<Utc>) -> String {
    match subject {
        Some(s) => s,
        None => format!("Announcement - {}", now.format("%Y-%m-%d")),
    }
}

/// Resolves the stock announcement image to a public URL. Anything going
/// wrong here is logged and swallowed: the pipeline proceeds without an
/// image rather than failing the delivery.
pub fn default_announcement_image(conn: &Connection, config: &Config) -> Option<String> {
    let asset = match profiles_db_operations::find_active_asset_by_location(
        conn,
        ANNOUNCEMENT_IMAGE_KEY,
    ) {
        Ok(asset) => asset?,
        Err(e) => {
            log::warn!("Default announcement image lookup failed: {}", e);
            return None;
        }
    };
    Some(resolve_image_url(&asset.storage_path, config))
}

/// Absolute URLs pass through; storage-relative paths join the public
/// media base.
pub fn resolve_image_url(storage_path: &str, config: &Config) -> String {
    if Url::parse(storage_path).is_ok() {
        return storage_path.to_string();
    }
    format!(
        "{}/{}",
        config.media_public_base.trim_end_matches('/'),
        storage_path.trim_start_matches('/')
    )
}

/// Shapes the cleaned delivery into the announcement draft the Repository
/// will persist. The section key doubles as the slug fallback for blog
/// routing, so it is derived from the title.
pub fn announcement_draft(
    title: &str,
    content: String,
    featured_image: Option<String>,
    now: DateTime<Utc>,
) -> NewContentPost {
    let mut section = slug_helpers::generate_slug(title);
    if section.is_empty() {
        section = format!("announcement-{}", now.timestamp());
    }
    NewContentPost {
        section,
        slug: None,
        title: Some(title.to_string()),
        content: Some(content),
        category: Some(Category::Announcements),
        section_type: SectionType::Blog,
        active: true,
        featured_image,
        use_ai_image_generation: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 15, 30, 0).unwrap()
    }

    #[test]
    fn json_prefers_direct_subject_over_nested() {
        let body = br#"{"subject":"Direct","headers":{"subject":"Nested"},"html":"<p>x</p>"}"#;
        let delivery = parse_json_delivery(body, now()).unwrap();
        assert_eq!(delivery.subject.as_deref(), Some("Direct"));

        let body = br#"{"headers":{"subject":"Nested"},"plain":"x"}"#;
        let delivery = parse_json_delivery(body, now()).unwrap();
        assert_eq!(delivery.subject.as_deref(), Some("Nested"));
    }

    #[test]
    fn json_date_parsing_with_fallback_to_now() {
        let body = br#"{"date":"Fri, 07 Aug 2026 10:00:00 +0000","plain":"x"}"#;
        let delivery = parse_json_delivery(body, now()).unwrap();
        assert_eq!(
            delivery.date,
            Utc.with_ymd_and_hms(2026, 8, 7, 10, 0, 0).unwrap()
        );

        let body = br#"{"date":"not a date","plain":"x"}"#;
        let delivery = parse_json_delivery(body, now()).unwrap();
        assert_eq!(delivery.date, now());

        let body = br#"{"plain":"x"}"#;
        let delivery = parse_json_delivery(body, now()).unwrap();
        assert_eq!(delivery.date, now());
    }

    #[test]
    fn field_map_reads_subject_from_raw_header_block() {
        let mut fields = HashMap::new();
        fields.insert(
            "headers".to_string(),
            "Received: relay\nSubject: From The Block\nMessage-ID: <abc@relay>".to_string(),
        );
        fields.insert("text".to_string(), "body".to_string());
        let delivery = delivery_from_fields(&fields, now());
        assert_eq!(delivery.subject.as_deref(), Some("From The Block"));
        assert_eq!(delivery.message_id.as_deref(), Some("<abc@relay>"));
        assert_eq!(delivery.plain, "body");
    }

    #[test]
    fn missing_subject_synthesizes_dated_title() {
        let title = subject_or_fallback(None, now());
        assert_eq!(title, "Announcement - 2026-08-07");
        assert!(title.starts_with("Announcement - "));
        assert_eq!(
            subject_or_fallback(Some("Pool Closed".to_string()), now()),
            "Pool Closed"
        );
    }

    #[test]
    fn image_urls_resolve_relative_against_media_base() {
        let config = Config::for_tests();
        assert_eq!(
            resolve_image_url("https://cdn.example.org/a.jpg", &config),
            "https://cdn.example.org/a.jpg"
        );
        assert_eq!(
            resolve_image_url("announcements/default.jpg", &config),
            format!("{}/announcements/default.jpg", config.media_public_base)
        );
    }

    #[test]
    fn draft_carries_announcement_defaults() {
        let draft = announcement_draft("Pool Closed Friday", "body".to_string(), None, now());
        assert_eq!(draft.section, "pool-closed-friday");
        assert_eq!(draft.category, Some(Category::Announcements));
        assert_eq!(draft.section_type, SectionType::Blog);
        assert!(draft.active);

        let untitled = announcement_draft("!!!", "body".to_string(), None, now());
        assert!(untitled.section.starts_with("announcement-"));
    }
}
