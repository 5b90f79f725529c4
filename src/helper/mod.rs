pub mod admin_helpers;
pub mod content_helpers;
pub mod diagnostics_helpers;
pub mod feed_helpers;
pub mod form_helpers;
pub mod ingest_helpers;
pub mod public_helpers;
pub mod slug_helpers;
