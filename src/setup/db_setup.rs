use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::{Connection, Result as RusqliteResult, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

/// Creates the sqlite side of the store: profiles, events, image assets,
/// settings, template references and the ingest dedup log.
pub fn setup_community_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    println!("- Creating 'profiles' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'member')),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_time TEXT
        )",
        [],
    )?;

    println!("- Creating 'events' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            image_path TEXT,
            category TEXT,
            is_featured INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_date ON events(date)",
        [],
    )?;

    println!("- Creating 'image_assets' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS image_assets (
            id TEXT PRIMARY KEY,
            storage_path TEXT NOT NULL,
            location_key TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            uploaded_at TEXT NOT NULL
        )",
        [],
    )?;

    println!("- Creating 'post_references' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS post_references (
            post_id TEXT NOT NULL,
            referenced_by TEXT NOT NULL,
            PRIMARY KEY (post_id, referenced_by)
        )",
        [],
    )?;

    println!("- Creating 'ingest_log' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS ingest_log (
            message_id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL,
            received_at TEXT NOT NULL
        )",
        [],
    )?;

    println!("- Creating 'settings' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    seed_initial_settings(&tx)?;

    tx.commit()?;
    Ok(())
}

fn seed_initial_settings(tx: &Transaction) -> RusqliteResult<()> {
    println!("- Seeding initial settings...");
    let default_page_size = "10";
    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('feed_page_size', ?1)",
        [&default_page_size],
    )?;
    println!("  > Default feed page size set to: {}", default_page_size);

    Ok(())
}

/// Creates the redb side of the store: post bodies, metadata and the slug
/// index.
pub fn setup_posts_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        println!("- Creating 'post_content' table in Redb...");
        write_txn.open_table(crate::models::db_operations::posts_db_operations::CONTENT)?;

        println!("- Creating 'post_metadata' table in Redb...");
        write_txn.open_table(crate::models::db_operations::posts_db_operations::METADATA)?;

        println!("- Creating 'post_slug_index' table in Redb...");
        write_txn.open_table(crate::models::db_operations::posts_db_operations::SLUG_INDEX)?;
    }
    write_txn.commit()?;
    Ok(())
}
