//! SQLite storage for token board client preferences.
//!
//! Connections come from an r2d2 pool; the schema is created by embedded
//! diesel migrations.

pub mod db;
pub mod errors;
pub mod schema;
pub mod settings;

pub use db::{create_pool, get_connection, init, run_migrations, DbPool};
pub use errors::StorageError;
pub use settings::SqliteSettingsRepository;
