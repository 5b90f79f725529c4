use crate::helper::{content_helpers, slug_helpers};
use crate::models::db_operations::posts_db_operations::{self, DbError};
use crate::models::db_operations::{events_db_operations, profiles_db_operations};
use crate::models::{
    ContentPost, ContentPostUpdate, Event, EventUpdate, NewContentPost, NewEvent, PostFilter,
    PostSort, SectionType, SECTION_CATALOG,
};
use crate::DbPool;
use redb::Database;
use thiserror::Error;

/// Failure classes the admin surface must keep distinct: each variant maps
/// to its own user-facing message and none of them is retried.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Record not found.")]
    NotFound,
    #[error("Permission denied: an administrator account is required.")]
    PermissionDenied,
    #[error("Record is still referenced by other content and cannot be deleted.")]
    ReferentialConflict,
    #[error("Slug '{0}' is already in use by another post.")]
    SlugTaken(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Post store error: {0}")]
    PostStore(DbError),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<DbError> for RepoError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(_) => RepoError::NotFound,
            DbError::SlugTaken(slug) => RepoError::SlugTaken(slug),
            other => RepoError::PostStore(other),
        }
    }
}

/// Delete pre-check: the acting identity must exist in the profiles table
/// with an active admin role. Session state alone is not trusted.
fn require_admin(pool: &DbPool, acting_username: &str) -> Result<(), RepoError> {
    let conn = pool.get()?;
    match profiles_db_operations::read_profile_by_username(&conn, acting_username) {
        Some(profile)
            if profile.is_active && profile.role == profiles_db_operations::ADMIN_ROLE =>
        {
            Ok(())
        }
        _ => Err(RepoError::PermissionDenied),
    }
}

fn validate_post_fields(
    section: &str,
    slug: Option<&str>,
    section_type: SectionType,
) -> Result<(), RepoError> {
    if section.trim().is_empty() {
        return Err(RepoError::Validation("Section key is required.".to_string()));
    }
    if let Some(slug) = slug {
        if !slug_helpers::is_valid_slug(slug) {
            return Err(RepoError::Validation(format!(
                "'{}' is not a valid slug (lowercase words joined by single hyphens).",
                slug
            )));
        }
    }
    if matches!(section_type, SectionType::Static | SectionType::System)
        && !SECTION_CATALOG.contains(&section)
    {
        return Err(RepoError::Validation(format!(
            "'{}' is not a known section key.",
            section
        )));
    }
    Ok(())
}

fn sanitize_draft(draft: &mut NewContentPost) {
    draft.section = content_helpers::strip_all_html(draft.section.trim());
    draft.title = draft
        .title
        .take()
        .map(|t| content_helpers::strip_all_html(t.trim()));
    draft.content = draft
        .content
        .take()
        .map(|c| content_helpers::sanitize_post_content(&c));
}

fn sanitize_update(patch: &mut ContentPostUpdate) {
    patch.section = content_helpers::strip_all_html(patch.section.trim());
    patch.title = patch
        .title
        .take()
        .map(|t| content_helpers::strip_all_html(t.trim()));
    patch.content = patch
        .content
        .take()
        .map(|c| content_helpers::sanitize_post_content(&c));
}

fn sync_template_references(
    pool: &DbPool,
    post_id: &str,
    content: Option<&str>,
) -> Result<(), RepoError> {
    let conn = pool.get()?;
    let refs = content
        .map(content_helpers::extract_template_refs)
        .unwrap_or_default();
    profiles_db_operations::replace_post_references(&conn, post_id, &refs)?;
    Ok(())
}

// --- Content posts ---

pub fn create_content_post(
    db: &Database,
    pool: &DbPool,
    acting_username: &str,
    mut draft: NewContentPost,
) -> Result<ContentPost, RepoError> {
    sanitize_draft(&mut draft);
    validate_post_fields(&draft.section, draft.slug.as_deref(), draft.section_type)?;
    let post = posts_db_operations::create_post(db, &draft, Some(acting_username))?;
    sync_template_references(pool, &post.id, post.content.as_deref())?;
    Ok(post)
}

pub fn update_content_post(
    db: &Database,
    pool: &DbPool,
    acting_username: &str,
    post_id: &str,
    mut patch: ContentPostUpdate,
) -> Result<ContentPost, RepoError> {
    sanitize_update(&mut patch);
    let existing = posts_db_operations::read_post(db, post_id)?.ok_or(RepoError::NotFound)?;
    validate_post_fields(&patch.section, patch.slug.as_deref(), existing.section_type)?;
    let post = posts_db_operations::update_post(db, post_id, &patch, Some(acting_username))?;
    sync_template_references(pool, &post.id, post.content.as_deref())?;
    Ok(post)
}

pub fn delete_content_post(
    db: &Database,
    pool: &DbPool,
    acting_username: &str,
    post_id: &str,
) -> Result<(), RepoError> {
    require_admin(pool, acting_username)?;
    {
        let conn = pool.get()?;
        if profiles_db_operations::count_post_references(&conn, post_id)? > 0 {
            return Err(RepoError::ReferentialConflict);
        }
    }
    posts_db_operations::delete_post(db, post_id)?;
    let conn = pool.get()?;
    profiles_db_operations::delete_references_from(&conn, post_id)?;
    Ok(())
}

/// Admin listing: exact-match predicates and sort run in the store; the
/// case-insensitive substring search is applied here afterwards because it
/// spans title, section and body at once.
pub fn list_content_posts(
    db: &Database,
    filter: &PostFilter,
    sort: &PostSort,
    search: Option<&str>,
) -> Result<Vec<ContentPost>, RepoError> {
    let mut posts = posts_db_operations::list_posts(db, filter, sort)?;
    if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        posts.retain(|post| {
            post.title
                .as_deref()
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false)
                || post.section.to_lowercase().contains(&needle)
                || post
                    .content
                    .as_deref()
                    .map(|c| c.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        });
    }
    Ok(posts)
}

// --- Events ---

pub fn create_event(
    pool: &DbPool,
    acting_username: &str,
    draft: &NewEvent,
) -> Result<Event, RepoError> {
    if draft.title.trim().is_empty() {
        return Err(RepoError::Validation("Event title is required.".to_string()));
    }
    let conn = pool.get()?;
    Ok(events_db_operations::create_event(&conn, draft, acting_username)?)
}

pub fn update_event(
    pool: &DbPool,
    event_id: &str,
    patch: &EventUpdate,
) -> Result<Event, RepoError> {
    if patch.title.trim().is_empty() {
        return Err(RepoError::Validation("Event title is required.".to_string()));
    }
    let conn = pool.get()?;
    if events_db_operations::update_event(&conn, event_id, patch)? == 0 {
        return Err(RepoError::NotFound);
    }
    events_db_operations::read_event(&conn, event_id)?.ok_or(RepoError::NotFound)
}

pub fn delete_event(
    pool: &DbPool,
    acting_username: &str,
    event_id: &str,
) -> Result<(), RepoError> {
    require_admin(pool, acting_username)?;
    let conn = pool.get()?;
    if events_db_operations::delete_event(&conn, event_id)? == 0 {
        return Err(RepoError::NotFound);
    }
    Ok(())
}

pub fn list_events(pool: &DbPool, category: Option<&str>) -> Result<Vec<Event>, RepoError> {
    let conn = pool.get()?;
    Ok(events_db_operations::list_events(&conn, category)?)
}
