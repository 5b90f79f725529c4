use crate::models::{Event, EventUpdate, NewEvent};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult, Row};
use uuid::Uuid;

const DATE_FMT: &str = "%Y-%m-%d";

fn parse_date(column: usize, raw: String) -> RusqliteResult<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(column: usize, raw: String) -> RusqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn map_event_row(row: &Row) -> RusqliteResult<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        date: parse_date(2, row.get(2)?)?,
        time: row.get(3)?,
        location: row.get(4)?,
        description: row.get(5)?,
        image_path: row.get(6)?,
        category: row.get(7)?,
        is_featured: row.get(8)?,
        created_at: parse_timestamp(9, row.get(9)?)?,
        created_by: row.get(10)?,
    })
}

const EVENT_COLUMNS: &str =
    "id, title, date, time, location, description, image_path, category, is_featured, created_at, created_by";

pub fn create_event(
    conn: &Connection,
    draft: &NewEvent,
    created_by: &str,
) -> RusqliteResult<Event> {
    let event = Event {
        id: Uuid::new_v4().to_string(),
        title: draft.title.clone(),
        date: draft.date,
        time: draft.time.clone(),
        location: draft.location.clone(),
        description: draft.description.clone(),
        image_path: draft.image_path.clone(),
        category: draft.category.clone(),
        is_featured: draft.is_featured,
        created_at: Utc::now(),
        created_by: created_by.to_string(),
    };
    conn.execute(
        "INSERT INTO events (id, title, date, time, location, description, image_path, category, is_featured, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            event.id,
            event.title,
            event.date.format(DATE_FMT).to_string(),
            event.time,
            event.location,
            event.description,
            event.image_path,
            event.category,
            event.is_featured,
            event.created_at.to_rfc3339(),
            event.created_by,
        ],
    )?;
    Ok(event)
}

pub fn read_event(conn: &Connection, event_id: &str) -> RusqliteResult<Option<Event>> {
    conn.query_row(
        &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
        [event_id],
        map_event_row,
    )
    .optional()
}

/// `created_at` and `created_by` are preserved; everything else is replaced.
pub fn update_event(
    conn: &Connection,
    event_id: &str,
    patch: &EventUpdate,
) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE events SET title = ?1, date = ?2, time = ?3, location = ?4, description = ?5,
         image_path = ?6, category = ?7, is_featured = ?8 WHERE id = ?9",
        params![
            patch.title,
            patch.date.format(DATE_FMT).to_string(),
            patch.time,
            patch.location,
            patch.description,
            patch.image_path,
            patch.category,
            patch.is_featured,
            event_id,
        ],
    )
}

pub fn delete_event(conn: &Connection, event_id: &str) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM events WHERE id = ?1", [event_id])
}

/// Date is the sole ordering key; ties keep insertion order as returned by
/// the store. The optional category filter is applied server-side.
pub fn list_events(conn: &Connection, category: Option<&str>) -> RusqliteResult<Vec<Event>> {
    let mut events = Vec::new();
    match category {
        Some(category) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events WHERE category = ?1 ORDER BY date ASC, rowid ASC",
                EVENT_COLUMNS
            ))?;
            let rows = stmt.query_map([category], map_event_row)?;
            for row in rows {
                events.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events ORDER BY date ASC, rowid ASC",
                EVENT_COLUMNS
            ))?;
            let rows = stmt.query_map([], map_event_row)?;
            for row in rows {
                events.push(row?);
            }
        }
    }
    Ok(events)
}

/// Highlight feed for the home page: featured events only, soonest first,
/// never older than the cutoff the caller derived from its pinned "today".
pub fn list_featured_events(conn: &Connection, cutoff: NaiveDate) -> RusqliteResult<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events WHERE is_featured = 1 AND date >= ?1 ORDER BY date ASC, rowid ASC",
        EVENT_COLUMNS
    ))?;
    let rows = stmt.query_map([cutoff.format(DATE_FMT).to_string()], map_event_row)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("in-memory sqlite");
        db_setup::setup_community_db(&mut conn).expect("schema");
        conn
    }

    fn draft(title: &str, date: &str, category: Option<&str>) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            date: NaiveDate::parse_from_str(date, DATE_FMT).unwrap(),
            time: "6:30 PM".to_string(),
            location: "Clubhouse".to_string(),
            description: "".to_string(),
            image_path: None,
            category: category.map(|s| s.to_string()),
            is_featured: false,
        }
    }

    #[test]
    fn create_and_read_round_trip() {
        let conn = test_conn();
        let event = create_event(&conn, &draft("Board Meeting", "2026-09-01", None), "admin")
            .unwrap();
        let read_back = read_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(read_back.title, "Board Meeting");
        assert_eq!(read_back.date, event.date);
        assert_eq!(read_back.created_by, "admin");
    }

    #[test]
    fn list_orders_by_date_and_filters_by_category() {
        let conn = test_conn();
        create_event(&conn, &draft("Later", "2026-10-01", Some("social")), "admin").unwrap();
        create_event(&conn, &draft("Sooner", "2026-09-01", Some("social")), "admin").unwrap();
        create_event(&conn, &draft("Other", "2026-08-15", Some("maintenance")), "admin").unwrap();

        let all = list_events(&conn, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "Other");

        let social = list_events(&conn, Some("social")).unwrap();
        assert_eq!(social.len(), 2);
        assert_eq!(social[0].title, "Sooner");
        assert_eq!(social[1].title, "Later");
    }

    #[test]
    fn update_replaces_fields_but_keeps_provenance() {
        let conn = test_conn();
        let event = create_event(&conn, &draft("Original", "2026-09-01", None), "admin").unwrap();
        let patch = EventUpdate {
            title: "Renamed".to_string(),
            date: NaiveDate::parse_from_str("2026-09-02", DATE_FMT).unwrap(),
            time: "7:00 PM".to_string(),
            location: "Pool deck".to_string(),
            description: "Moved".to_string(),
            image_path: None,
            category: None,
            is_featured: true,
        };
        assert_eq!(update_event(&conn, &event.id, &patch).unwrap(), 1);
        let read_back = read_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(read_back.title, "Renamed");
        assert!(read_back.is_featured);
        assert_eq!(read_back.created_at, event.created_at);
        assert_eq!(read_back.created_by, "admin");
    }

    #[test]
    fn featured_listing_honors_cutoff() {
        let conn = test_conn();
        let mut featured = draft("Featured", "2026-09-01", None);
        featured.is_featured = true;
        create_event(&conn, &featured, "admin").unwrap();
        let mut stale = draft("Stale", "2026-01-01", None);
        stale.is_featured = true;
        create_event(&conn, &stale, "admin").unwrap();

        let cutoff = NaiveDate::parse_from_str("2026-08-01", DATE_FMT).unwrap();
        let listed = list_featured_events(&conn, cutoff).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Featured");
    }
}
