use crate::models::{
    Category, ContentPost, Event, FeedItem, PostFilter, PostSort, SectionType,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::cmp::Ordering;

/// Events older than this never surface, even under an "all" filter.
pub const EVENT_GRACE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy)]
pub struct FeedQuery {
    pub category: Option<Category>,
    pub page: usize,
    pub page_size: usize,
    /// Pinned once per request. Tier membership and the staleness cutoff
    /// both derive from this value, never from a clock read mid-sort.
    pub today: NaiveDate,
}

impl FeedQuery {
    pub fn cutoff(&self) -> NaiveDate {
        self.today - Duration::days(EVENT_GRACE_DAYS)
    }
}

/// The store-side filter used for the posts half of the feed: only active
/// blog posts participate.
pub fn feed_post_filter(category: Option<Category>) -> PostFilter {
    PostFilter {
        section_type: Some(SectionType::Blog),
        category,
        active: Some(true),
    }
}

pub fn feed_post_sort() -> PostSort {
    PostSort::default()
}

fn compare_items(a: &FeedItem, b: &FeedItem) -> Ordering {
    // Three tiers collapse to two flags here because `upcoming` was fixed
    // per item against one "today": upcoming events first (soonest first),
    // everything else most-recent first. Equal dates keep fetch order via
    // the stable sort.
    match (a.upcoming, b.upcoming) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a.display_date.cmp(&b.display_date),
        (false, false) => b.display_date.cmp(&a.display_date),
    }
}

/// Merges the two independently fetched halves into one ranked page.
pub fn build_feed(events: Vec<Event>, posts: Vec<ContentPost>, query: &FeedQuery) -> Vec<FeedItem> {
    let cutoff = query.cutoff();

    let mut items: Vec<FeedItem> = Vec::new();
    for event in events {
        if event.date < cutoff {
            continue;
        }
        items.push(FeedItem::from_event(event, query.today));
    }
    for post in posts {
        items.push(FeedItem::from_post(post));
    }

    items.sort_by(compare_items);

    items
        .into_iter()
        .skip(query.page * query.page_size)
        .take(query.page_size)
        .collect()
}

/// Representative placeholder content for the visitor-facing feed when a
/// backing fetch fails; a populated page beats an error page there. The
/// dates hang off the request's pinned "today" so the seed ranks sensibly.
pub fn fallback_feed(query: &FeedQuery) -> Vec<FeedItem> {
    let seed_time = Utc
        .from_utc_datetime(&query.today.and_hms_opt(12, 0, 0).unwrap_or_default());

    let events = vec![Event {
        id: "seed-event-board-meeting".to_string(),
        title: "Monthly Board Meeting".to_string(),
        date: query.today + Duration::days(7),
        time: "7:00 PM".to_string(),
        location: "Community Clubhouse".to_string(),
        description: "Open session for all residents. Agenda posted in the lobby.".to_string(),
        image_path: None,
        category: Some("community".to_string()),
        is_featured: true,
        created_at: seed_time,
        created_by: "system".to_string(),
    }];

    let posts = vec![
        ContentPost {
            id: "seed-post-welcome".to_string(),
            section: "welcome-to-the-neighborhood".to_string(),
            slug: None,
            title: Some("Welcome to the Neighborhood".to_string()),
            content: Some(
                "News and announcements from the association will appear here.".to_string(),
            ),
            category: Some(Category::General),
            section_type: SectionType::Blog,
            active: true,
            featured_image: None,
            use_ai_image_generation: false,
            created_at: seed_time - Duration::days(1),
            updated_at: seed_time - Duration::days(1),
            last_updated_by: None,
        },
        ContentPost {
            id: "seed-post-amenities".to_string(),
            section: "amenity-hours".to_string(),
            slug: None,
            title: Some("Amenity Hours".to_string()),
            content: Some("Pool and gym hours are listed on the amenities page.".to_string()),
            category: Some(Category::Community),
            section_type: SectionType::Blog,
            active: true,
            featured_image: None,
            use_ai_image_generation: false,
            created_at: seed_time - Duration::days(2),
            updated_at: seed_time - Duration::days(2),
            last_updated_by: None,
        },
    ];

    build_feed(events, posts, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedSource;
    use chrono::{Duration, TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    fn query() -> FeedQuery {
        FeedQuery {
            category: None,
            page: 0,
            page_size: 20,
            today: today(),
        }
    }

    fn event_on(id: &str, date: NaiveDate) -> Event {
        Event {
            id: id.to_string(),
            title: id.to_string(),
            date,
            time: String::new(),
            location: String::new(),
            description: String::new(),
            image_path: None,
            category: None,
            is_featured: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            created_by: "admin".to_string(),
        }
    }

    fn post_created(id: &str, days_ago: i64) -> ContentPost {
        let created = Utc
            .from_utc_datetime(&(today() - Duration::days(days_ago)).and_hms_opt(9, 0, 0).unwrap());
        ContentPost {
            id: id.to_string(),
            section: id.to_string(),
            slug: None,
            title: Some(id.to_string()),
            content: None,
            category: Some(Category::News),
            section_type: SectionType::Blog,
            active: true,
            featured_image: None,
            use_ai_image_generation: false,
            created_at: created,
            updated_at: created,
            last_updated_by: None,
        }
    }

    fn ids(items: &[FeedItem]) -> Vec<String> {
        items
            .iter()
            .map(|item| match &item.source {
                FeedSource::Event(e) => e.id.clone(),
                FeedSource::Post(p) => p.id.clone(),
            })
            .collect()
    }

    #[test]
    fn upcoming_events_lead_then_recency() {
        let events = vec![
            event_on("past-event", today() - Duration::days(3)),
            event_on("upcoming-event", today() + Duration::days(5)),
        ];
        let posts = vec![post_created("post", 1)];
        let feed = build_feed(events, posts, &query());
        assert_eq!(ids(&feed), vec!["upcoming-event", "post", "past-event"]);
    }

    #[test]
    fn events_past_grace_window_never_surface() {
        let events = vec![
            event_on("stale", today() - Duration::days(10)),
            event_on("graced", today() - Duration::days(7)),
        ];
        let feed = build_feed(events, Vec::new(), &query());
        assert_eq!(ids(&feed), vec!["graced"]);
    }

    #[test]
    fn two_upcoming_events_sort_soonest_first() {
        let events = vec![
            event_on("later", today() + Duration::days(9)),
            event_on("sooner", today() + Duration::days(2)),
            event_on("today-event", today()),
        ];
        let feed = build_feed(events, Vec::new(), &query());
        assert_eq!(ids(&feed), vec!["today-event", "sooner", "later"]);
    }

    #[test]
    fn ordering_is_deterministic_and_transitive() {
        let events = vec![
            event_on("e1", today() + Duration::days(3)),
            event_on("e2", today() - Duration::days(2)),
        ];
        let posts = vec![post_created("p1", 1), post_created("p2", 4)];

        let first = ids(&build_feed(events.clone(), posts.clone(), &query()));
        let second = ids(&build_feed(events, posts, &query()));
        assert_eq!(first, second);
        assert_eq!(first, vec!["e1", "p1", "e2", "p2"]);
    }

    #[test]
    fn equal_dates_keep_fetch_order() {
        let events = vec![
            event_on("first-fetched", today() + Duration::days(1)),
            event_on("second-fetched", today() + Duration::days(1)),
        ];
        let feed = build_feed(events, Vec::new(), &query());
        assert_eq!(ids(&feed), vec!["first-fetched", "second-fetched"]);
    }

    #[test]
    fn pagination_applies_after_ranking() {
        let posts = (0..5).map(|i| post_created(&format!("p{}", i), i)).collect::<Vec<_>>();
        let mut q = query();
        q.page_size = 2;
        q.page = 1;
        let feed = build_feed(Vec::new(), posts, &q);
        assert_eq!(ids(&feed), vec!["p2", "p3"]);
    }

    #[test]
    fn fallback_feed_is_populated_and_ranked() {
        let feed = fallback_feed(&query());
        assert!(!feed.is_empty());
        assert!(matches!(feed[0].source, FeedSource::Event(_)));
        assert!(feed[0].upcoming);
    }
}
