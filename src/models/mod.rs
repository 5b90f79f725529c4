use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Fixed classification catalog for content posts. Events carry a free-text
/// category on top of this, so filters that span both kinds match on the
/// string form (see `Category::as_str`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    News,
    Announcements,
    Events,
    Community,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::News => "news",
            Category::Announcements => "announcements",
            Category::Events => "events",
            Category::Community => "community",
        }
    }
}

/// Which consumer treats the record as what. Immutable after creation:
/// `ContentPostUpdate` deliberately has no `section_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Static,
    Blog,
    System,
    Template,
}

/// Semantic keys allowed for the `section` field of static/system posts.
pub const SECTION_CATALOG: &[&str] = &[
    "home-hero",
    "home-welcome",
    "about",
    "amenities",
    "contact",
    "footer",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPost {
    pub id: String,
    pub section: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub section_type: SectionType,
    pub active: bool,
    pub featured_image: Option<String>,
    pub use_ai_image_generation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_updated_by: Option<String>,
}

/// The slice of a content post that lives in the metadata table; the body
/// is stored separately so list scans stay cheap when content is large.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMeta {
    pub section: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub category: Option<Category>,
    pub section_type: SectionType,
    pub active: bool,
    pub featured_image: Option<String>,
    pub use_ai_image_generation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_updated_by: Option<String>,
}

impl ContentPost {
    pub fn from_parts(id: String, meta: PostMeta, content: Option<String>) -> Self {
        ContentPost {
            id,
            section: meta.section,
            slug: meta.slug,
            title: meta.title,
            content,
            category: meta.category,
            section_type: meta.section_type,
            active: meta.active,
            featured_image: meta.featured_image,
            use_ai_image_generation: meta.use_ai_image_generation,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            last_updated_by: meta.last_updated_by,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContentPost {
    pub section: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub section_type: SectionType,
    #[serde(default = "default_true")]
    pub active: bool,
    pub featured_image: Option<String>,
    #[serde(default)]
    pub use_ai_image_generation: bool,
}

/// Full-field update. `id`, `created_at` and `section_type` are not part of
/// the patch; the store preserves them and stamps a fresh `updated_at`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPostUpdate {
    pub section: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub active: bool,
    pub featured_image: Option<String>,
    #[serde(default)]
    pub use_ai_image_generation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    /// Sole ordering key. `time` below is display text and is never parsed.
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
    pub description: String,
    pub image_path: Option<String>,
    pub category: Option<String>,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub image_path: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventUpdate {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub image_path: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
}

/// The two record kinds the feed merges. Consumers match exhaustively so a
/// third content kind becomes a compile-time change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedSource {
    Event(Event),
    Post(ContentPost),
}

/// Transient, computed, never persisted. `display_date` and `upcoming` are
/// fixed at construction against a single pinned "today" so the ranking
/// comparator stays total for the whole sort pass.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub source: FeedSource,
    pub display_date: NaiveDate,
    #[serde(skip)]
    pub upcoming: bool,
}

impl FeedItem {
    pub fn from_event(event: Event, today: NaiveDate) -> Self {
        let display_date = event.date;
        FeedItem {
            upcoming: display_date >= today,
            display_date,
            source: FeedSource::Event(event),
        }
    }

    pub fn from_post(post: ContentPost) -> Self {
        FeedItem {
            display_date: post.created_at.date_naive(),
            upcoming: false,
            source: FeedSource::Post(post),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageAsset {
    pub id: String,
    pub storage_path: String,
    pub location_key: Option<String>,
    pub is_active: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// One captured line in the admin diagnostics ring buffer.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub at: DateTime<Utc>,
    pub source: String,
    pub message: String,
}

// --- List filter/sort contract for the posts store ---

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSortField {
    #[default]
    UpdatedAt,
    CreatedAt,
    Title,
    Section,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostSort {
    pub field: PostSortField,
    pub direction: SortDirection,
}

/// Exact-match predicates applied by the store layer. The substring search
/// lives in the helper layer (`admin_helpers::list_content_posts`) because
/// it also has to scan post bodies.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub section_type: Option<SectionType>,
    pub category: Option<Category>,
    pub active: Option<bool>,
}

pub mod db_operations;
