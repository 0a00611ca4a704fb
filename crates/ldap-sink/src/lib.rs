//! LDAP transport for the dirsync engine.
//!
//! [`LdapConnector`] implements `sync_core::DirectoryConnector` on top of
//! `ldap3`: each `bind` opens a new TCP connection, spawns its driver and
//! performs a simple bind. The returned [`LdapConnection`] is owned by one
//! handler invocation and unbound when it completes.

mod connection;
mod connector;

pub use connection::LdapConnection;
pub use connector::LdapConnector;
