use std::sync::Arc;

use helper::diagnostics_helpers::DiagnosticsLog;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use sync::{ChangeHub, LiveFeed};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Process-wide shared state: the diagnostics ring buffer, the change
/// notification hub, and the live-refreshed home feed snapshot.
pub struct AppState {
    pub diagnostics: Arc<DiagnosticsLog>,
    pub changes: ChangeHub,
    pub live_feed: LiveFeed,
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
pub mod sync;
