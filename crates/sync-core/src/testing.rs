//! Test doubles for the directory and relational transports.
//!
//! Used by this crate's tests and by downstream crates exercising the
//! engine without a live LDAP server or database.

mod directory;
pub mod filter;
mod source;

pub use directory::{InMemoryConnection, InMemoryDirectory, WriteRecord};
pub use source::ScriptedSource;
