//! SQLite database module for the VPay engine.
//!
//! The schema lives in `migrations/`. [`SqliteDatabase::run_migrations`] brings a database up to date.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
