//! Sqlite persistence via Diesel with embedded migrations.

mod model;
mod schema;
mod store;

pub use store::{DbPool, SqliteStore, MIGRATIONS};
