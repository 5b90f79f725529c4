use crate::helper::diagnostics_helpers::DiagnosticsLog;
use crate::helper::feed_helpers::{self, FeedQuery};
use crate::models::db_operations::{events_db_operations, posts_db_operations};
use crate::models::{ContentPost, Event, FeedItem};
use crate::DbPool;
use redb::Database;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Post store error: {0}")]
    PostStore(#[from] posts_db_operations::DbError),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// The two source fetches, kept independent on purpose: events and posts
/// are never joined in one query.
pub fn fetch_feed(db: &Database, pool: &DbPool, query: &FeedQuery) -> Result<Vec<FeedItem>, FeedError> {
    let events = {
        let conn = pool.get()?;
        events_db_operations::list_events(&conn, query.category.map(|c| c.as_str()))?
    };
    let posts = posts_db_operations::list_posts(
        db,
        &feed_helpers::feed_post_filter(query.category),
        &feed_helpers::feed_post_sort(),
    )?;
    Ok(feed_helpers::build_feed(events, posts, query))
}

/// Visitor-facing variant: a failed fetch degrades to the seed list so the
/// public page never renders empty; the error is logged and captured for
/// the admin diagnostics view, not surfaced.
pub fn fetch_feed_or_fallback(
    db: &Database,
    pool: &DbPool,
    diagnostics: &DiagnosticsLog,
    query: &FeedQuery,
) -> Vec<FeedItem> {
    match fetch_feed(db, pool, query) {
        Ok(items) => items,
        Err(e) => {
            log::error!("Public feed aggregation failed, serving fallback: {}", e);
            diagnostics.capture("feed", &e.to_string());
            feed_helpers::fallback_feed(query)
        }
    }
}

pub fn fetch_featured_events(pool: &DbPool, query: &FeedQuery) -> Result<Vec<Event>, FeedError> {
    let conn = pool.get()?;
    Ok(events_db_operations::list_featured_events(&conn, query.cutoff())?)
}

pub fn fetch_post_by_slug(db: &Database, slug: &str) -> Result<Option<ContentPost>, FeedError> {
    let post = posts_db_operations::read_post_by_slug(db, slug)?;
    // Inactive posts stay editable but never resolve publicly.
    Ok(post.filter(|p| p.active))
}

pub fn fetch_section(db: &Database, section: &str) -> Result<Option<ContentPost>, FeedError> {
    Ok(posts_db_operations::read_post_by_section(db, section)?)
}

pub fn verify_admin_credentials(
    pool: &DbPool,
    username: &str,
    password: &str,
) -> Option<(String, String)> {
    if let Ok(conn) = pool.get() {
        crate::models::db_operations::profiles_db_operations::verify_credentials(
            &conn, username, password,
        )
    } else {
        None
    }
}
