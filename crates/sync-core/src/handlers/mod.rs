//! Event → directory mutation policies.
//!
//! Each handler decides, for one CREATE/UPDATE/DELETE event, which
//! directory mutation to apply:
//!
//! - [`CopyHandler`] mirrors one row to one entry
//! - [`AccumulateHandler`] adds/removes one row's value in a multi-valued
//!   attribute
//! - [`AccumulateFromQueryHandler`] recomputes a multi-valued attribute from
//!   a query on every touching event
//! - [`StoreIfExistsHandler`] toggles a flag value depending on whether any
//!   row still references the entry
//!
//! Handlers hold only immutable configuration. Accumulator state lives in the
//! directory and is read fresh before every write; nothing is cached. The
//! read-modify-write cycle is not protected by a lock, so events touching
//! the same entry must be delivered one at a time.

mod accumulate;
mod accumulate_query;
mod copy;
mod store_if_exists;

pub use accumulate::AccumulateHandler;
pub use accumulate_query::{AccumulateFromQueryHandler, FOREIGN_ID_PLACEHOLDER};
pub use copy::CopyHandler;
pub use store_if_exists::{KeyBinding, StoreIfExistsHandler};

use crate::directory::DirectoryConnection;
use crate::error::{SyncError, SyncResult};
use crate::event::{ChangeEvent, EventKind};
use crate::source::RelationalSource;
use crate::values::{Row, SqlValue};
use async_trait::async_trait;

#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Short handler type name used in logs.
    fn name(&self) -> &'static str;

    async fn handle_insert(
        &self,
        table: &str,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()>;

    async fn handle_update(
        &self,
        table: &str,
        old_row: &Row,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()>;

    async fn handle_delete(
        &self,
        table: &str,
        old_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()>;

    /// Route `event` to the matching `handle_*` method.
    async fn handle(
        &self,
        event: &ChangeEvent,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let table = event.source_table();
        match (event.kind(), event.old_row(), event.new_row()) {
            (EventKind::Create, _, Some(new)) => self.handle_insert(table, new, dir, source).await,
            (EventKind::Update, Some(old), Some(new)) => {
                self.handle_update(table, old, new, dir, source).await
            }
            (EventKind::Delete, Some(old), _) => self.handle_delete(table, old, dir, source).await,
            (kind, _, _) => Err(SyncError::MalformedEvent {
                kind: kind.to_string(),
                table: table.to_string(),
                reason: "row presence does not match the event kind".to_string(),
            }),
        }
    }
}

/// Read a column that must be present (it may be null).
pub(crate) fn required<'a>(row: &'a Row, column: &str) -> SyncResult<&'a SqlValue> {
    row.get(column).ok_or_else(|| SyncError::MissingColumn {
        column: column.to_string(),
    })
}
