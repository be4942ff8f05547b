//! SQLite backend for the top-up store.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
