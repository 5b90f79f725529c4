use crate::helper::admin_helpers::{self, RepoError};
use crate::helper::public_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::profiles_db_operations;
use crate::models::{
    Category, ContentPostUpdate, EventUpdate, NewContentPost, NewEvent, PostFilter, PostSort,
    PostSortField, SectionType, SortDirection,
};
use crate::sync::{ChangeOp, WatchedTable};
use crate::{AppState, DbPool};
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(handle_admin_login))
        .route("/logout", web::post().to(handle_admin_logout));
}

pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(list_posts_action))
        .route("/posts", web::post().to(create_post_action))
        .route("/posts/{id}", web::put().to(update_post_action))
        .route("/posts/{id}", web::delete().to(delete_post_action))
        .route("/events", web::post().to(create_event_action))
        .route("/events/{id}", web::put().to(update_event_action))
        .route("/events/{id}", web::delete().to(delete_event_action))
        .route("/settings", web::post().to(update_settings_action))
        .route("/diagnostics", web::get().to(list_diagnostics_action))
        .route("/diagnostics/clear", web::post().to(clear_diagnostics_action));
}

#[derive(Deserialize)]
struct SettingsForm {
    feed_page_size: Option<u32>,
}

async fn update_settings_action(
    pool: web::Data<DbPool>,
    form: web::Json<SettingsForm>,
) -> impl Responder {
    let Some(page_size) = form.feed_page_size else {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "No settings provided." }));
    };
    if page_size == 0 || page_size > 100 {
        return HttpResponse::BadRequest().json(
            json!({ "success": false, "error": "feed_page_size must be between 1 and 100." }),
        );
    }
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Database pool error on settings update: {}", e);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "A database error occurred." }));
        }
    };
    match profiles_db_operations::update_setting(&conn, "feed_page_size", &page_size.to_string())
    {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => {
            log::error!("Failed to update feed_page_size: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to update settings." }))
        }
    }
}

/// Maps each failure class to its own status and message. Nothing here is
/// retried; a retry is the admin clicking the button again.
fn error_response(e: RepoError) -> HttpResponse {
    let body = json!({ "success": false, "error": e.to_string() });
    match e {
        RepoError::NotFound => HttpResponse::NotFound().json(body),
        RepoError::PermissionDenied => HttpResponse::Forbidden().json(body),
        RepoError::ReferentialConflict => HttpResponse::Conflict().json(body),
        RepoError::SlugTaken(_) | RepoError::Validation(_) => {
            HttpResponse::BadRequest().json(body)
        }
        RepoError::PostStore(_) | RepoError::Database(_) | RepoError::Pool(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

async fn handle_admin_login(
    session: Session,
    pool: web::Data<DbPool>,
    form: web::Json<LoginForm>,
) -> impl Responder {
    if let Some((username, role)) =
        public_helpers::verify_admin_credentials(&pool, &form.username, &form.password)
    {
        if role == "admin" {
            if session.insert("username", username.clone()).is_err()
                || session.insert("role", role).is_err()
            {
                return HttpResponse::InternalServerError()
                    .json(json!({ "success": false, "error": "Failed to establish session." }));
            }
            if let Ok(conn) = pool.get() {
                if let Err(e) = profiles_db_operations::update_last_login_time(&conn, &username) {
                    log::warn!("Could not record last login time for '{}': {}", username, e);
                }
            }
            return HttpResponse::Ok().json(json!({ "success": true }));
        }
        return HttpResponse::Forbidden().json(
            json!({ "success": false, "error": "Access denied. Only administrators may log in here." }),
        );
    }
    HttpResponse::Unauthorized()
        .json(json!({ "success": false, "error": "Invalid credentials or account suspended." }))
}

async fn handle_admin_logout(session: Session) -> impl Responder {
    session.clear();
    HttpResponse::Ok().json(json!({ "success": true }))
}

#[derive(Deserialize)]
pub struct PostListQuery {
    section_type: Option<SectionType>,
    category: Option<Category>,
    active: Option<bool>,
    q: Option<String>,
    sort: Option<PostSortField>,
    direction: Option<SortDirection>,
}

/// Admin listings surface fetch errors directly; accuracy beats an
/// always-populated view here.
async fn list_posts_action(
    db: web::Data<Database>,
    query: web::Query<PostListQuery>,
) -> impl Responder {
    let filter = PostFilter {
        section_type: query.section_type,
        category: query.category,
        active: query.active,
    };
    let sort = PostSort {
        field: query.sort.unwrap_or_default(),
        direction: query.direction.unwrap_or_default(),
    };
    match admin_helpers::list_content_posts(&db, &filter, &sort, query.q.as_deref()) {
        Ok(posts) => HttpResponse::Ok().json(json!({ "success": true, "data": posts })),
        Err(e) => {
            log::error!("Admin post listing failed: {}", e);
            error_response(e)
        }
    }
}

async fn create_post_action(
    auth_user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    draft: web::Json<NewContentPost>,
) -> impl Responder {
    match admin_helpers::create_content_post(&db, &pool, &auth_user.username, draft.into_inner())
    {
        Ok(post) => {
            state.changes.notify(WatchedTable::ContentPosts, ChangeOp::Insert);
            HttpResponse::Ok().json(json!({ "success": true, "data": post }))
        }
        Err(e) => {
            log::error!("Failed to create post: {}", e);
            error_response(e)
        }
    }
}

async fn update_post_action(
    auth_user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    post_id: web::Path<String>,
    patch: web::Json<ContentPostUpdate>,
) -> impl Responder {
    match admin_helpers::update_content_post(
        &db,
        &pool,
        &auth_user.username,
        &post_id,
        patch.into_inner(),
    ) {
        Ok(post) => {
            state.changes.notify(WatchedTable::ContentPosts, ChangeOp::Update);
            HttpResponse::Ok().json(json!({ "success": true, "data": post }))
        }
        Err(e) => {
            log::error!("Failed to update post {}: {}", post_id, e);
            error_response(e)
        }
    }
}

async fn delete_post_action(
    auth_user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    post_id: web::Path<String>,
) -> impl Responder {
    match admin_helpers::delete_content_post(&db, &pool, &auth_user.username, &post_id) {
        Ok(()) => {
            state.changes.notify(WatchedTable::ContentPosts, ChangeOp::Delete);
            HttpResponse::Ok()
                .json(json!({ "success": true, "message": "Post deleted successfully." }))
        }
        Err(e) => {
            log::error!("Failed to delete post {}: {}", post_id, e);
            error_response(e)
        }
    }
}

async fn create_event_action(
    auth_user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    draft: web::Json<NewEvent>,
) -> impl Responder {
    match admin_helpers::create_event(&pool, &auth_user.username, &draft) {
        Ok(event) => {
            state.changes.notify(WatchedTable::Events, ChangeOp::Insert);
            HttpResponse::Ok().json(json!({ "success": true, "data": event }))
        }
        Err(e) => {
            log::error!("Failed to create event: {}", e);
            error_response(e)
        }
    }
}

async fn update_event_action(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    event_id: web::Path<String>,
    patch: web::Json<EventUpdate>,
) -> impl Responder {
    match admin_helpers::update_event(&pool, &event_id, &patch) {
        Ok(event) => {
            state.changes.notify(WatchedTable::Events, ChangeOp::Update);
            HttpResponse::Ok().json(json!({ "success": true, "data": event }))
        }
        Err(e) => {
            log::error!("Failed to update event {}: {}", event_id, e);
            error_response(e)
        }
    }
}

async fn delete_event_action(
    auth_user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    event_id: web::Path<String>,
) -> impl Responder {
    match admin_helpers::delete_event(&pool, &auth_user.username, &event_id) {
        Ok(()) => {
            state.changes.notify(WatchedTable::Events, ChangeOp::Delete);
            HttpResponse::Ok()
                .json(json!({ "success": true, "message": "Event deleted successfully." }))
        }
        Err(e) => {
            log::error!("Failed to delete event {}: {}", event_id, e);
            error_response(e)
        }
    }
}

async fn list_diagnostics_action(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "success": true, "data": state.diagnostics.list() }))
}

async fn clear_diagnostics_action(state: web::Data<AppState>) -> impl Responder {
    state.diagnostics.clear();
    HttpResponse::Ok().json(json!({ "success": true }))
}
