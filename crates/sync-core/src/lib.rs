//! Synchronization engine propagating relational row changes into an LDAP
//! directory.
//!
//! A database trigger (or a replay of captured events) hands the engine one
//! [`ChangeEvent`] at a time. The [`Dispatcher`] looks up the handlers bound
//! to the event's table and runs each of them against a freshly bound
//! directory connection:
//!
//! ```text
//! ChangeEvent ──► Dispatcher ──► SyncHandler ──► DirectoryModel ──► DirectoryConnection
//!                                    │
//!                                    └──► RelationalSource (joins, auxiliary queries)
//! ```
//!
//! - [`values`] - relational values and rows
//! - [`template`] - `{placeholder}` templates for filters, DNs and queries
//! - [`directory`] - directory transport traits and entry types
//! - [`model`] - finding, creating, modifying and deleting entries of one type
//! - [`diff`] - minimal modification deltas
//! - [`join`] - resolving identifying attributes through foreign tables
//! - [`handlers`] - the four event → mutation policies
//! - [`dispatch`] - table bindings and per-event connection scoping
//!
//! Concrete transports live in `dirsync-ldap-sink` and
//! `dirsync-postgresql-source`; [`testing`] provides in-memory doubles.

pub mod attribute_map;
pub mod diff;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod join;
pub mod model;
pub mod source;
pub mod template;
pub mod values;

#[doc(hidden)]
pub mod testing;

pub use attribute_map::AttributeMap;
pub use directory::{
    Attributes, DirectoryConnection, DirectoryConnector, DirectoryCredentials, DirectoryEntry,
    ModOp, Modification, SearchScope,
};
pub use dispatch::{handle_event, Binding, Dispatcher};
pub use error::{SyncError, SyncResult, WriteOperation};
pub use event::{ChangeEvent, EventKind, RawChangeEvent};
pub use handlers::{
    AccumulateFromQueryHandler, AccumulateHandler, CopyHandler, KeyBinding, StoreIfExistsHandler,
    SyncHandler,
};
pub use join::{JoinOutcome, JoinSpec, KeySource, KeysMap};
pub use model::DirectoryModel;
pub use source::RelationalSource;
pub use template::Template;
pub use values::{Row, SqlValue};
