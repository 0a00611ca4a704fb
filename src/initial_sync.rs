//! Backfilling the directory from existing rows.
//!
//! Every row of a bound table is read and dispatched as a synthetic CREATE
//! event, exactly as if it had just been inserted.

use anyhow::{bail, Context, Result};
use sync_core::source::{quote_qualified_ident, run_query};
use sync_core::{ChangeEvent, Dispatcher, RelationalSource};
use tracing::info;

/// Dispatch a CREATE event for every row of `table`. Returns the number of
/// rows synchronized.
pub async fn initial_sync(
    dispatcher: &Dispatcher,
    table: &str,
    source: &mut dyn RelationalSource,
) -> Result<usize> {
    if dispatcher.handlers_for(table).next().is_none() {
        bail!("no handler is bound to table {table}");
    }

    let query = format!("SELECT * FROM {}", quote_qualified_ident(table));
    let rows = run_query(source, &query).await?;
    info!("initial sync of {table}: {} row(s)", rows.len());

    let total = rows.len();
    for (index, row) in rows.into_iter().enumerate() {
        let event = ChangeEvent::create(table, row);
        dispatcher
            .dispatch(&event, source)
            .await
            .with_context(|| format!("initial sync of {table} failed at row {}", index + 1))?;
    }

    info!("initial sync of {table} done");
    Ok(total)
}
