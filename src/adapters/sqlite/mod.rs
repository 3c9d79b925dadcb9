//! SQLite adapters - per-project history store files.

mod condition;
mod history_store;
mod schema;

pub use history_store::{SqliteHistoryStore, SqliteStoreFactory};
pub use schema::SCHEMA_VERSION;
