pub mod events_db_operations;
pub mod posts_db_operations;
pub mod profiles_db_operations;
