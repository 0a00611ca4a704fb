//! PostgreSQL implementation of `sync_core::RelationalSource`.
//!
//! Used by the `dirsync` CLI to answer auxiliary queries (joins, dynamic
//! attributes, accumulator queries, existence counts) and to scan tables
//! for the initial sync.

mod client;
mod value;

pub use client::{new_postgresql_client, PostgresSource};
pub use value::{convert_postgres_row, convert_postgres_value};
