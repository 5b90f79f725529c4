use crate::config::Config;
use crate::helper::ingest_helpers::{self, InboundDelivery, IngestError};
use crate::helper::{content_helpers, form_helpers};
use crate::models::db_operations::{posts_db_operations, profiles_db_operations};
use crate::sync::{ChangeOp, WatchedTable};
use crate::{AppState, DbPool};
use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt as _;
use redb::Database;
use serde_json::json;
use std::collections::HashMap;

/// Inbound mail arrives from a relay on another origin; this scope answers
/// pre-flights itself and accepts anyone.
pub fn ingest_cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_header()
        .allowed_methods(vec!["POST", "OPTIONS"])
        .max_age(3600)
}

pub fn config_ingest(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/ingest")
            .wrap(ingest_cors())
            .route("/announcement", web::post().to(ingest_announcement)),
    );
}

async fn collect_body(mut payload: web::Payload) -> Result<web::Bytes, IngestError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| IngestError::Body(e.to_string()))?;
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

async fn parse_multipart_fields(
    mut payload: Multipart,
) -> Result<HashMap<String, String>, IngestError> {
    let mut fields = HashMap::new();
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| IngestError::Multipart(e.to_string()))?;
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();
        let mut value = web::BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| IngestError::Multipart(e.to_string()))?;
            value.extend_from_slice(&chunk);
        }
        let value = String::from_utf8(value.to_vec()).map_err(|_| IngestError::Utf8)?;
        fields.insert(name, value);
    }
    Ok(fields)
}

fn failure_response(
    state: &AppState,
    error: &str,
    details: impl std::fmt::Display,
) -> HttpResponse {
    let details = details.to_string();
    log::error!("Announcement ingest failed: {}: {}", error, details);
    state.diagnostics.capture("ingest", &format!("{}: {}", error, details));
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "error": error,
        "details": details,
    }))
}

/// Accepts one inbound email delivery in any of the three wire shapes and
/// materializes exactly one announcement post. Missing subject or body are
/// repaired, not rejected; the relay does not meaningfully retry and a
/// dropped announcement is worse than a malformed one.
async fn ingest_announcement(
    req: HttpRequest,
    payload: web::Payload,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
) -> impl Responder {
    let now = Utc::now();
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let delivery: InboundDelivery = if content_type.starts_with("application/json") {
        let body = match collect_body(payload).await {
            Ok(body) => body,
            Err(e) => return failure_response(&state, "Failed to read request body", e),
        };
        match ingest_helpers::parse_json_delivery(&body, now) {
            Ok(delivery) => delivery,
            Err(e) => return failure_response(&state, "Failed to parse JSON payload", e),
        }
    } else if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::new(req.headers(), payload);
        match parse_multipart_fields(multipart).await {
            Ok(fields) => ingest_helpers::delivery_from_fields(&fields, now),
            Err(e) => return failure_response(&state, "Failed to parse multipart payload", e),
        }
    } else {
        // Unspecified content types are treated as URL-encoded forms.
        let body = match collect_body(payload).await {
            Ok(body) => body,
            Err(e) => return failure_response(&state, "Failed to read request body", e),
        };
        match form_helpers::parse_form(&body) {
            Ok(fields) => ingest_helpers::delivery_from_fields(&fields, now),
            Err(_) => {
                return failure_response(
                    &state,
                    "Failed to parse form payload",
                    IngestError::Utf8,
                )
            }
        }
    };

    let title = content_helpers::strip_all_html(
        ingest_helpers::subject_or_fallback(delivery.subject, delivery.date).trim(),
    );
    let content = content_helpers::extract_clean_content(&delivery.html, &delivery.plain);

    // Relays re-deliver after timeouts; a known message id short-circuits
    // to the post it already produced.
    if let Some(message_id) = delivery.message_id.as_deref() {
        match pool.get() {
            Ok(conn) => {
                if let Ok(Some(existing)) =
                    profiles_db_operations::lookup_ingest_message(&conn, message_id)
                {
                    return HttpResponse::Ok().json(json!({
                        "success": true,
                        "message": "duplicate delivery ignored",
                        "announcement_id": existing,
                        "title": title,
                        "featured_image": serde_json::Value::Null,
                    }));
                }
            }
            Err(e) => log::warn!("Skipping ingest dedup check, pool unavailable: {}", e),
        }
    }

    let featured_image = pool
        .get()
        .ok()
        .and_then(|conn| ingest_helpers::default_announcement_image(&conn, &config));

    let draft =
        ingest_helpers::announcement_draft(&title, content, featured_image.clone(), now);
    // System-generated record: no acting user.
    let post = match posts_db_operations::create_post(&db, &draft, None) {
        Ok(post) => post,
        Err(e) => return failure_response(&state, "Failed to create announcement", e),
    };

    if let Some(message_id) = delivery.message_id.as_deref() {
        if let Ok(conn) = pool.get() {
            if let Err(e) = profiles_db_operations::record_ingest_message(&conn, message_id, &post.id)
            {
                log::warn!("Failed to record ingest message id '{}': {}", message_id, e);
            }
        }
    }

    state.changes.notify(WatchedTable::ContentPosts, ChangeOp::Insert);

    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Announcement created",
        "announcement_id": post.id,
        "title": post.title,
        "featured_image": featured_image,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::diagnostics_helpers::DiagnosticsLog;
    use crate::helper::feed_helpers::FeedQuery;
    use crate::helper::public_helpers;
    use crate::models::{Category, FeedSource, SectionType};
    use crate::setup::db_setup;
    use crate::sync::{ChangeHub, LiveFeed};
    use actix_web::{test, App};
    use r2d2_sqlite::SqliteConnectionManager;
    use redb::backends::InMemoryBackend;
    use std::sync::Arc;

    fn test_pool() -> DbPool {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
        {
            let mut conn = pool.get().unwrap();
            db_setup::setup_community_db(&mut conn).unwrap();
        }
        pool
    }

    fn test_state(hub: ChangeHub) -> AppState {
        let live_feed = LiveFeed::spawn(
            hub.subscribe(&[WatchedTable::ContentPosts, WatchedTable::Events]),
            || Ok::<_, std::convert::Infallible>(Vec::new()),
        );
        AppState {
            diagnostics: Arc::new(DiagnosticsLog::new(32)),
            changes: hub,
            live_feed,
        }
    }

    struct TestHarness {
        db: web::Data<Database>,
        pool: web::Data<DbPool>,
        state: web::Data<AppState>,
    }

    fn harness() -> TestHarness {
        let db = web::Data::new(
            Database::builder()
                .create_with_backend(InMemoryBackend::new())
                .unwrap(),
        );
        let pool = web::Data::new(test_pool());
        let state = web::Data::new(test_state(ChangeHub::new()));
        TestHarness { db, pool, state }
    }

    macro_rules! test_app {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .app_data($h.db.clone())
                    .app_data($h.pool.clone())
                    .app_data(web::Data::new(Config::for_tests()))
                    .app_data($h.state.clone())
                    .configure(config_ingest),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn json_delivery_creates_a_ranked_announcement() {
        let h = harness();
        let app = test_app!(h);

        let req = test::TestRequest::post()
            .uri("/api/ingest/announcement")
            .set_json(json!({
                "subject": "Pool Closed",
                "html": "<p>Pool closed Friday</p>",
                "envelope": { "from": "a@b.com", "to": "c@d.com" }
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["title"], json!("Pool Closed"));
        let id = body["announcement_id"].as_str().unwrap().to_string();

        let post = posts_db_operations::read_post(&h.db, &id).unwrap().unwrap();
        assert_eq!(post.title.as_deref(), Some("Pool Closed"));
        assert_eq!(post.content.as_deref(), Some("Pool closed Friday"));
        assert_eq!(post.category, Some(Category::Announcements));
        assert_eq!(post.section_type, SectionType::Blog);
        assert!(post.active);
        assert!(post.last_updated_by.is_none());

        // The new announcement surfaces in the aggregated feed, ranked as a
        // non-event item by its creation date.
        let query = FeedQuery {
            category: None,
            page: 0,
            page_size: 10,
            today: Utc::now().date_naive(),
        };
        let feed = public_helpers::fetch_feed(&h.db, &h.pool, &query).unwrap();
        assert!(feed.iter().any(|item| match &item.source {
            FeedSource::Post(p) => p.id == id && !item.upcoming,
            FeedSource::Event(_) => false,
        }));
    }

    #[actix_web::test]
    async fn missing_subject_everywhere_synthesizes_dated_title() {
        let h = harness();
        let app = test_app!(h);

        let req = test::TestRequest::post()
            .uri("/api/ingest/announcement")
            .set_json(json!({ "plain": "water shutoff at noon" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], json!(true));
        let title = body["title"].as_str().unwrap();
        assert!(
            title.starts_with("Announcement - ") && title.len() > "Announcement - ".len(),
            "unexpected fallback title {:?}",
            title
        );
    }

    #[actix_web::test]
    async fn unspecified_content_type_is_parsed_as_urlencoded() {
        let h = harness();
        let app = test_app!(h);

        let raw_headers = "Subject: Gate Repair\nMessage-ID: <m1@relay>";
        let body = format!(
            "headers={}&text={}",
            url::form_urlencoded::byte_serialize(raw_headers.as_bytes()).collect::<String>(),
            url::form_urlencoded::byte_serialize(b"Gate repair starts Monday morning")
                .collect::<String>(),
        );
        let req = test::TestRequest::post()
            .uri("/api/ingest/announcement")
            .set_payload(body)
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["success"], json!(true));
        assert_eq!(resp["title"], json!("Gate Repair"));

        let id = resp["announcement_id"].as_str().unwrap();
        let post = posts_db_operations::read_post(&h.db, id).unwrap().unwrap();
        assert_eq!(post.content.as_deref(), Some("Gate repair starts Monday morning"));
    }

    #[actix_web::test]
    async fn repeated_message_id_does_not_duplicate_the_post() {
        let h = harness();
        let app = test_app!(h);

        let payload = json!({
            "subject": "Paving Schedule",
            "plain": "Paving begins next week",
            "message_id": "<paving-1@relay>"
        });
        let req = test::TestRequest::post()
            .uri("/api/ingest/announcement")
            .set_json(payload.clone())
            .to_request();
        let first: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let req = test::TestRequest::post()
            .uri("/api/ingest/announcement")
            .set_json(payload)
            .to_request();
        let second: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(first["announcement_id"], second["announcement_id"]);
        assert_eq!(second["message"], json!("duplicate delivery ignored"));

        let listed = posts_db_operations::list_posts(
            &h.db,
            &Default::default(),
            &Default::default(),
        )
        .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[actix_web::test]
    async fn default_image_is_attached_when_the_reserved_asset_exists() {
        let h = harness();
        {
            let conn = h.pool.get().unwrap();
            profiles_db_operations::add_image_asset(
                &conn,
                "announcements/default.jpg",
                Some(ingest_helpers::ANNOUNCEMENT_IMAGE_KEY),
            )
            .unwrap();
        }
        let app = test_app!(h);

        let req = test::TestRequest::post()
            .uri("/api/ingest/announcement")
            .set_json(json!({ "subject": "With Image", "plain": "some body text here" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["featured_image"], json!("/media/announcements/default.jpg"));
    }

    #[actix_web::test]
    async fn preflight_is_answered_with_no_body() {
        let h = harness();
        let app = test_app!(h);

        let req = test::TestRequest::with_uri("/api/ingest/announcement")
            .method(actix_web::http::Method::OPTIONS)
            .insert_header((header::ORIGIN, "https://relay.example.org"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        assert!(body.is_empty());
    }
}
