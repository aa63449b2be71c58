//! SQLite-backed purchase store.

mod connection;
mod helpers;
mod migrations;
mod repositories;

pub use connection::Database;
pub use migrations::CURRENT_SCHEMA_VERSION;
pub use repositories::purchases::UpsertOutcome;
