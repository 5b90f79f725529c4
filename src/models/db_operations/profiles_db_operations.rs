use crate::models::{ImageAsset, Profile};
use bcrypt::{hash, verify, BcryptError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension};
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

pub fn create_profile(
    conn: &Connection,
    username: &str,
    password: &str,
    role: &str,
) -> Result<(), RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO profiles (username, password_hash, role) VALUES (?1, ?2, ?3)",
        params![username, hashed_password, role],
    )?;
    Ok(())
}

pub fn read_profile_by_username(conn: &Connection, username: &str) -> Option<Profile> {
    conn.query_row(
        "SELECT id, username, role, is_active, last_login_time FROM profiles WHERE username = ?1",
        [username],
        |row| {
            Ok(Profile {
                id: row.get(0)?,
                username: row.get(1)?,
                role: row.get(2)?,
                is_active: row.get(3)?,
                last_login_time: row.get(4)?,
            })
        },
    )
    .ok()
}

pub fn verify_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Option<(String, String)> {
    let res: rusqlite::Result<(String, String, bool)> = conn.query_row(
        "SELECT password_hash, role, is_active FROM profiles WHERE username = ?1",
        [username],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    );

    if let Ok((hash, role, is_active)) = res {
        if is_active && verify(password, &hash).unwrap_or(false) {
            return Some((username.to_string(), role));
        }
    }
    None
}

pub fn update_last_login_time(conn: &Connection, username: &str) -> Result<(), RusqliteError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE profiles SET last_login_time = ?1 WHERE username = ?2",
        params![now, username],
    )?;
    Ok(())
}

pub fn read_setting(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
    .unwrap_or(None)
}

pub fn update_setting(conn: &Connection, key: &str, value: &str) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

// --- Image assets ---

fn parse_timestamp(column: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            RusqliteError::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

pub fn add_image_asset(
    conn: &Connection,
    storage_path: &str,
    location_key: Option<&str>,
) -> Result<ImageAsset, RusqliteError> {
    let asset = ImageAsset {
        id: Uuid::new_v4().to_string(),
        storage_path: storage_path.to_string(),
        location_key: location_key.map(|s| s.to_string()),
        is_active: true,
        uploaded_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO image_assets (id, storage_path, location_key, is_active, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            asset.id,
            asset.storage_path,
            asset.location_key,
            asset.is_active,
            asset.uploaded_at.to_rfc3339(),
        ],
    )?;
    Ok(asset)
}

/// At most one active asset is expected per reserved location key; if an
/// admin uploaded several, the newest wins.
pub fn find_active_asset_by_location(
    conn: &Connection,
    location_key: &str,
) -> Result<Option<ImageAsset>, RusqliteError> {
    conn.query_row(
        "SELECT id, storage_path, location_key, is_active, uploaded_at FROM image_assets
         WHERE location_key = ?1 AND is_active = 1 ORDER BY uploaded_at DESC LIMIT 1",
        [location_key],
        |row| {
            Ok(ImageAsset {
                id: row.get(0)?,
                storage_path: row.get(1)?,
                location_key: row.get(2)?,
                is_active: row.get(3)?,
                uploaded_at: parse_timestamp(4, row.get(4)?)?,
            })
        },
    )
    .optional()
}

// --- Post references ---
// Static pages can embed template posts; those links live here so deletes
// of a still-referenced post can be refused with a distinct error.

pub fn replace_post_references(
    conn: &Connection,
    referencing_id: &str,
    referenced_ids: &[String],
) -> Result<(), RusqliteError> {
    conn.execute(
        "DELETE FROM post_references WHERE referenced_by = ?1",
        [referencing_id],
    )?;
    for referenced in referenced_ids {
        conn.execute(
            "INSERT OR IGNORE INTO post_references (post_id, referenced_by) VALUES (?1, ?2)",
            params![referenced, referencing_id],
        )?;
    }
    Ok(())
}

pub fn delete_references_from(
    conn: &Connection,
    referencing_id: &str,
) -> Result<usize, RusqliteError> {
    conn.execute(
        "DELETE FROM post_references WHERE referenced_by = ?1",
        [referencing_id],
    )
}

pub fn count_post_references(conn: &Connection, post_id: &str) -> Result<i64, RusqliteError> {
    conn.query_row(
        "SELECT COUNT(*) FROM post_references WHERE post_id = ?1",
        [post_id],
        |row| row.get(0),
    )
}

// --- Ingest log ---
// Mail relays re-deliver after timeouts; recording the relay message id
// turns a duplicate delivery into a lookup instead of a second post.

pub fn record_ingest_message(
    conn: &Connection,
    message_id: &str,
    post_id: &str,
) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR IGNORE INTO ingest_log (message_id, post_id, received_at) VALUES (?1, ?2, ?3)",
        params![message_id, post_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn lookup_ingest_message(
    conn: &Connection,
    message_id: &str,
) -> Result<Option<String>, RusqliteError> {
    conn.query_row(
        "SELECT post_id FROM ingest_log WHERE message_id = ?1",
        [message_id],
        |row| row.get(0),
    )
    .optional()
}
