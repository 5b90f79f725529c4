use crate::helper::feed_helpers::FeedQuery;
use crate::helper::public_helpers;
use crate::models::Category;
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use redb::Database;
use serde::Deserialize;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 50;

#[derive(Deserialize)]
pub struct FeedApiQuery {
    category: Option<Category>,
    page: Option<usize>,
    page_size: Option<usize>,
}

impl FeedApiQuery {
    /// "today" is pinned here, once per request, and threaded through the
    /// whole aggregation pass.
    fn to_feed_query(&self, default_page_size: usize) -> FeedQuery {
        FeedQuery {
            category: self.category,
            page: self.page.unwrap_or(0),
            page_size: self
                .page_size
                .unwrap_or(default_page_size)
                .clamp(1, MAX_PAGE_SIZE),
            today: Utc::now().date_naive(),
        }
    }
}

/// Admin-tunable default; falls back to the compiled-in value when the
/// setting is missing or unreadable.
fn configured_page_size(pool: &DbPool) -> usize {
    use crate::models::db_operations::profiles_db_operations;
    pool.get()
        .ok()
        .and_then(|conn| profiles_db_operations::read_setting(&conn, "feed_page_size"))
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/is_server_active", web::get().to(is_server_active))
            .route("/feed", web::get().to(get_feed))
            .route("/feed/live", web::get().to(get_live_feed))
            .route("/feed/featured", web::get().to(get_featured_events))
            .route("/events", web::get().to(get_events))
            .route("/posts/{slug}", web::get().to(get_post_by_slug))
            .route("/sections/{section}", web::get().to(get_section)),
    );
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

/// Visitor-facing merged feed. Fetch failures degrade to the seed list
/// (logged + captured), never to an error page.
async fn get_feed(
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    query: web::Query<FeedApiQuery>,
) -> impl Responder {
    let feed_query = query.to_feed_query(configured_page_size(&pool));
    let items =
        public_helpers::fetch_feed_or_fallback(&db, &pool, &state.diagnostics, &feed_query);
    HttpResponse::Ok().json(items)
}

/// The change-notification-refreshed snapshot; no fetch happens on request.
async fn get_live_feed(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.live_feed.snapshot())
}

async fn get_featured_events(
    pool: web::Data<DbPool>,
    query: web::Query<FeedApiQuery>,
) -> impl Responder {
    let feed_query = query.to_feed_query(DEFAULT_PAGE_SIZE);
    match public_helpers::fetch_featured_events(&pool, &feed_query) {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => {
            log::error!("Failed to fetch featured events: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Deserialize)]
pub struct EventListQuery {
    category: Option<String>,
}

async fn get_events(
    pool: web::Data<DbPool>,
    query: web::Query<EventListQuery>,
) -> impl Responder {
    match crate::helper::admin_helpers::list_events(&pool, query.category.as_deref()) {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(e) => {
            log::error!("Failed to fetch events: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_post_by_slug(slug: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_post_by_slug(&db, &slug) {
        Ok(Some(post)) => HttpResponse::Ok().json(post),
        Ok(None) => HttpResponse::NotFound().body("Post not found"),
        Err(e) => {
            log::error!("Failed to fetch post by slug '{}': {}", slug, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn get_section(section: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_section(&db, &section) {
        Ok(Some(post)) => HttpResponse::Ok().json(post),
        Ok(None) => HttpResponse::NotFound().body("Section not found"),
        Err(e) => {
            log::error!("Failed to fetch section '{}': {}", section, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
