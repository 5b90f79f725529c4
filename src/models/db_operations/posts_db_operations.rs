use redb::{
    CommitError, Database, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};

use crate::models::{
    ContentPost, ContentPostUpdate, NewContentPost, PostFilter, PostMeta, PostSort, PostSortField,
    SortDirection,
};
use chrono::Utc;
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Slug is already taken: {0}")]
    SlugTaken(String),
}

// Post bodies and metadata live in separate tables; list scans only touch
// metadata unless the caller asks for content.
pub const CONTENT: TableDefinition<&[u8; 16], &str> = TableDefinition::new("post_content");
pub const METADATA: TableDefinition<&[u8; 16], &str> = TableDefinition::new("post_metadata");
// Canonical slug -> post id. Doubles as the uniqueness constraint: creates
// and updates that would collide are rejected here, not in the slug engine.
pub const SLUG_INDEX: TableDefinition<&str, &[u8; 16]> = TableDefinition::new("post_slug_index");

pub fn create_post(
    db: &Database,
    draft: &NewContentPost,
    actor: Option<&str>,
) -> Result<ContentPost, DbError> {
    let post_uuid = Uuid::new_v4();
    let post_id_bytes = post_uuid.into_bytes();
    let now = Utc::now();

    let meta = PostMeta {
        section: draft.section.clone(),
        slug: draft.slug.clone(),
        title: draft.title.clone(),
        category: draft.category,
        section_type: draft.section_type,
        active: draft.active,
        featured_image: draft.featured_image.clone(),
        use_ai_image_generation: draft.use_ai_image_generation,
        created_at: now,
        updated_at: now,
        last_updated_by: actor.map(|s| s.to_string()),
    };
    let meta_json = serde_json::to_string(&meta)?;

    let write_txn = db.begin_write()?;
    {
        let mut content_table = write_txn.open_table(CONTENT)?;
        let mut metadata_table = write_txn.open_table(METADATA)?;
        let mut slug_index = write_txn.open_table(SLUG_INDEX)?;

        if let Some(slug) = meta.slug.as_deref() {
            if slug_index.get(slug)?.is_some() {
                return Err(DbError::SlugTaken(slug.to_string()));
            }
            slug_index.insert(slug, &post_id_bytes)?;
        }

        if let Some(content) = draft.content.as_deref() {
            content_table.insert(&post_id_bytes, content)?;
        }
        metadata_table.insert(&post_id_bytes, meta_json.as_str())?;
    }
    write_txn.commit()?;

    Ok(ContentPost::from_parts(
        post_uuid.to_string(),
        meta,
        draft.content.clone(),
    ))
}

pub fn update_post(
    db: &Database,
    post_id: &str,
    patch: &ContentPostUpdate,
    actor: Option<&str>,
) -> Result<ContentPost, DbError> {
    let post_uuid = Uuid::parse_str(post_id)?;
    let post_id_bytes = post_uuid.into_bytes();

    let write_txn = db.begin_write()?;
    let new_meta = {
        let mut content_table = write_txn.open_table(CONTENT)?;
        let mut metadata_table = write_txn.open_table(METADATA)?;
        let mut slug_index = write_txn.open_table(SLUG_INDEX)?;

        let old_meta: PostMeta = {
            let guard = metadata_table
                .get(&post_id_bytes)?
                .ok_or_else(|| DbError::NotFound(post_id.to_string()))?;
            serde_json::from_str(guard.value())?
        };

        // Re-index the slug only when it actually changes.
        if old_meta.slug != patch.slug {
            if let Some(old_slug) = old_meta.slug.as_deref() {
                slug_index.remove(old_slug)?;
            }
            if let Some(new_slug) = patch.slug.as_deref() {
                if slug_index.get(new_slug)?.is_some() {
                    return Err(DbError::SlugTaken(new_slug.to_string()));
                }
                slug_index.insert(new_slug, &post_id_bytes)?;
            }
        }

        let new_meta = PostMeta {
            section: patch.section.clone(),
            slug: patch.slug.clone(),
            title: patch.title.clone(),
            category: patch.category,
            // Shape is fixed once a post exists; the patch type carries no
            // section_type and created_at is preserved from the old record.
            section_type: old_meta.section_type,
            active: patch.active,
            featured_image: patch.featured_image.clone(),
            use_ai_image_generation: patch.use_ai_image_generation,
            created_at: old_meta.created_at,
            updated_at: Utc::now(),
            last_updated_by: actor.map(|s| s.to_string()),
        };
        let new_meta_json = serde_json::to_string(&new_meta)?;

        match patch.content.as_deref() {
            Some(content) => {
                content_table.insert(&post_id_bytes, content)?;
            }
            None => {
                content_table.remove(&post_id_bytes)?;
            }
        }
        metadata_table.insert(&post_id_bytes, new_meta_json.as_str())?;
        new_meta
    };
    write_txn.commit()?;

    Ok(ContentPost::from_parts(
        post_id.to_string(),
        new_meta,
        patch.content.clone(),
    ))
}

pub fn delete_post(db: &Database, post_id: &str) -> Result<(), DbError> {
    let post_uuid = Uuid::parse_str(post_id)?;
    let post_id_bytes = post_uuid.into_bytes();

    let write_txn = db.begin_write()?;
    {
        let mut content_table = write_txn.open_table(CONTENT)?;
        let mut metadata_table = write_txn.open_table(METADATA)?;
        let mut slug_index = write_txn.open_table(SLUG_INDEX)?;

        let meta: PostMeta = {
            let guard = metadata_table
                .get(&post_id_bytes)?
                .ok_or_else(|| DbError::NotFound(post_id.to_string()))?;
            serde_json::from_str(guard.value())?
        };

        if let Some(slug) = meta.slug.as_deref() {
            slug_index.remove(slug)?;
        }
        content_table.remove(&post_id_bytes)?;
        metadata_table.remove(&post_id_bytes)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_post(db: &Database, post_id: &str) -> Result<Option<ContentPost>, DbError> {
    let post_uuid = match Uuid::parse_str(post_id) {
        Ok(uuid) => uuid,
        Err(_) => return Ok(None),
    };
    let post_id_bytes = post_uuid.into_bytes();

    let read_txn = db.begin_read()?;
    let metadata_table = read_txn.open_table(METADATA)?;
    let content_table = read_txn.open_table(CONTENT)?;

    let meta: PostMeta = match metadata_table.get(&post_id_bytes)? {
        Some(guard) => serde_json::from_str(guard.value())?,
        None => return Ok(None),
    };
    let content = content_table
        .get(&post_id_bytes)?
        .map(|guard| guard.value().to_string());

    Ok(Some(ContentPost::from_parts(
        post_id.to_string(),
        meta,
        content,
    )))
}

/// Blog routing resolves the canonical slug first and only falls back to a
/// `section` match on blog posts when no slug is indexed under that name.
pub fn read_post_by_slug(db: &Database, slug: &str) -> Result<Option<ContentPost>, DbError> {
    let read_txn = db.begin_read()?;
    let slug_index = read_txn.open_table(SLUG_INDEX)?;

    if let Some(guard) = slug_index.get(slug)? {
        let post_uuid = Uuid::from_bytes(*guard.value());
        drop(guard);
        return read_post(db, &post_uuid.to_string());
    }
    drop(slug_index);

    let metadata_table = read_txn.open_table(METADATA)?;
    let content_table = read_txn.open_table(CONTENT)?;
    for item in metadata_table.iter()? {
        let (id_bytes, meta_str) = item?;
        let meta: PostMeta = match serde_json::from_str(meta_str.value()) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        if meta.section == slug && matches!(meta.section_type, crate::models::SectionType::Blog) {
            let post_uuid = Uuid::from_bytes(*id_bytes.value());
            let content = content_table
                .get(id_bytes.value())?
                .map(|guard| guard.value().to_string());
            return Ok(Some(ContentPost::from_parts(
                post_uuid.to_string(),
                meta,
                content,
            )));
        }
    }
    Ok(None)
}

/// Returns the single active static/system post for a catalog section key.
pub fn read_post_by_section(db: &Database, section: &str) -> Result<Option<ContentPost>, DbError> {
    let read_txn = db.begin_read()?;
    let metadata_table = read_txn.open_table(METADATA)?;
    let content_table = read_txn.open_table(CONTENT)?;

    for item in metadata_table.iter()? {
        let (id_bytes, meta_str) = item?;
        let meta: PostMeta = match serde_json::from_str(meta_str.value()) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let routable = matches!(
            meta.section_type,
            crate::models::SectionType::Static | crate::models::SectionType::System
        );
        if routable && meta.active && meta.section == section {
            let post_uuid = Uuid::from_bytes(*id_bytes.value());
            let content = content_table
                .get(id_bytes.value())?
                .map(|guard| guard.value().to_string());
            return Ok(Some(ContentPost::from_parts(
                post_uuid.to_string(),
                meta,
                content,
            )));
        }
    }
    Ok(None)
}

fn compare_posts(a: &ContentPost, b: &ContentPost, sort: &PostSort) -> Ordering {
    let ordering = match sort.field {
        PostSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        PostSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        PostSortField::Title => a
            .title
            .as_deref()
            .unwrap_or("")
            .to_lowercase()
            .cmp(&b.title.as_deref().unwrap_or("").to_lowercase()),
        PostSortField::Section => a.section.cmp(&b.section),
    };
    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Full scan with exact-match predicates and a single (field, direction)
/// sort, applied here in the store layer. Sorting is in memory, same as the
/// pending-posts path always was; the data set is association-sized.
pub fn list_posts(
    db: &Database,
    filter: &PostFilter,
    sort: &PostSort,
) -> Result<Vec<ContentPost>, DbError> {
    let read_txn = db.begin_read()?;
    let metadata_table = read_txn.open_table(METADATA)?;
    let content_table = read_txn.open_table(CONTENT)?;

    let mut posts: Vec<ContentPost> = Vec::new();
    for item in metadata_table.iter()? {
        let (id_bytes, meta_str) = item?;
        let meta: PostMeta = match serde_json::from_str(meta_str.value()) {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("Skipping undecodable post metadata: {}", e);
                continue;
            }
        };

        if let Some(section_type) = filter.section_type {
            if meta.section_type != section_type {
                continue;
            }
        }
        if let Some(category) = filter.category {
            if meta.category != Some(category) {
                continue;
            }
        }
        if let Some(active) = filter.active {
            if meta.active != active {
                continue;
            }
        }

        let post_uuid = Uuid::from_bytes(*id_bytes.value());
        let content = content_table
            .get(id_bytes.value())?
            .map(|guard| guard.value().to_string());
        posts.push(ContentPost::from_parts(post_uuid.to_string(), meta, content));
    }

    posts.sort_by(|a, b| compare_posts(a, b, sort));
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, SectionType};
    use redb::backends::InMemoryBackend;

    fn test_db() -> Database {
        Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .expect("in-memory redb")
    }

    fn blog_draft(section: &str, slug: Option<&str>) -> NewContentPost {
        NewContentPost {
            section: section.to_string(),
            slug: slug.map(|s| s.to_string()),
            title: Some(format!("Title for {}", section)),
            content: Some("Body".to_string()),
            category: Some(Category::News),
            section_type: SectionType::Blog,
            active: true,
            featured_image: None,
            use_ai_image_generation: false,
        }
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let db = test_db();
        let post = create_post(&db, &blog_draft("first-post", None), Some("admin")).unwrap();
        assert!(Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(post.last_updated_by.as_deref(), Some("admin"));

        let read_back = read_post(&db, &post.id).unwrap().unwrap();
        assert_eq!(read_back.section, "first-post");
        assert_eq!(read_back.content.as_deref(), Some("Body"));
    }

    #[test]
    fn update_preserves_created_at_and_stamps_updated_at() {
        let db = test_db();
        let post = create_post(&db, &blog_draft("keep-created", None), None).unwrap();
        let patch = ContentPostUpdate {
            section: "keep-created".to_string(),
            slug: None,
            title: Some("Edited".to_string()),
            content: Some("Edited body".to_string()),
            category: Some(Category::News),
            active: true,
            featured_image: None,
            use_ai_image_generation: false,
        };
        let updated = update_post(&db, &post.id, &patch, Some("editor")).unwrap();
        assert_eq!(updated.created_at, post.created_at);
        assert!(updated.updated_at >= post.updated_at);
        assert_eq!(updated.title.as_deref(), Some("Edited"));
        assert_eq!(updated.section_type, SectionType::Blog);
    }

    #[test]
    fn slug_collisions_are_rejected() {
        let db = test_db();
        create_post(&db, &blog_draft("a", Some("pool-news")), None).unwrap();
        let err = create_post(&db, &blog_draft("b", Some("pool-news")), None).unwrap_err();
        assert!(matches!(err, DbError::SlugTaken(s) if s == "pool-news"));
    }

    #[test]
    fn slug_is_released_on_delete() {
        let db = test_db();
        let post = create_post(&db, &blog_draft("a", Some("reusable")), None).unwrap();
        delete_post(&db, &post.id).unwrap();
        create_post(&db, &blog_draft("b", Some("reusable")), None).unwrap();
    }

    #[test]
    fn delete_missing_post_is_not_found() {
        let db = test_db();
        let err = delete_post(&db, &Uuid::new_v4().to_string()).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn slug_lookup_falls_back_to_blog_section() {
        let db = test_db();
        create_post(&db, &blog_draft("legacy-route", None), None).unwrap();
        let found = read_post_by_slug(&db, "legacy-route").unwrap().unwrap();
        assert_eq!(found.section, "legacy-route");

        let canonical = create_post(&db, &blog_draft("other", Some("canonical")), None).unwrap();
        let by_slug = read_post_by_slug(&db, "canonical").unwrap().unwrap();
        assert_eq!(by_slug.id, canonical.id);
    }

    #[test]
    fn list_applies_exact_predicates_and_sort() {
        let db = test_db();
        let mut draft = blog_draft("one", None);
        draft.category = Some(Category::Announcements);
        create_post(&db, &draft, None).unwrap();
        let mut inactive = blog_draft("two", None);
        inactive.active = false;
        create_post(&db, &inactive, None).unwrap();
        create_post(&db, &blog_draft("three", None), None).unwrap();

        let filter = PostFilter {
            section_type: Some(SectionType::Blog),
            category: None,
            active: Some(true),
        };
        let listed = list_posts(&db, &filter, &PostSort::default()).unwrap();
        assert_eq!(listed.len(), 2);
        // Default sort is updated_at descending.
        assert!(listed[0].updated_at >= listed[1].updated_at);

        let filter = PostFilter {
            section_type: None,
            category: Some(Category::Announcements),
            active: None,
        };
        let listed = list_posts(&db, &filter, &PostSort::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].section, "one");
    }
}
