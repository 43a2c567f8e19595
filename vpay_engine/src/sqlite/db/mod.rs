//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod merchants;
pub mod orders;
pub mod payments;
pub mod reservations;

const SQLITE_DB_URL: &str = "sqlite://data/vpay_store.db";

pub fn db_url() -> String {
    let result = env::var("VPAY_DATABASE_URL").unwrap_or_else(|_| {
        info!("VPAY_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Maps a unique-constraint violation to `Some(constraint message)`, so that callers can turn it into a domain error.
pub(crate) fn unique_violation(e: &SqlxError) -> Option<String> {
    match e {
        SqlxError::Database(db) if db.is_unique_violation() => Some(db.message().to_string()),
        _ => None,
    }
}
