use super::{required, SyncHandler};
use crate::directory::{Attributes, DirectoryConnection};
use crate::error::{SyncError, SyncResult};
use crate::model::{identity, DirectoryModel};
use crate::source::{quote_ident, quote_literal, quote_qualified_ident, run_query, RelationalSource};
use crate::values::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Directory attribute identifying the target entry, and the row column
/// holding its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub attr: String,
    pub column: String,
}

impl KeyBinding {
    pub fn new(attr: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            column: column.into(),
        }
    }
}

/// Sets `store_attr = store_val` on an entry while at least one row of the
/// source table references it, and removes the value when the last one goes.
#[derive(Debug, Clone)]
pub struct StoreIfExistsHandler {
    key: KeyBinding,
    store_attr: String,
    store_val: String,
    model: Arc<DirectoryModel>,
    deleting_row_visible: bool,
}

impl StoreIfExistsHandler {
    pub fn new(
        key: KeyBinding,
        store_attr: impl Into<String>,
        store_val: impl Into<String>,
        model: Arc<DirectoryModel>,
    ) -> Self {
        Self {
            key,
            store_attr: store_attr.into(),
            store_val: store_val.into(),
            model,
            deleting_row_visible: true,
        }
    }

    /// Whether the row being deleted is still visible to the count query.
    ///
    /// True for BEFORE-row triggers (the default), false when events are
    /// delivered after the row is gone.
    pub fn with_deleting_row_visible(mut self, visible: bool) -> Self {
        self.deleting_row_visible = visible;
        self
    }

    fn identity_of(&self, row: &Row) -> SyncResult<Option<(String, Attributes)>> {
        let value = required(row, &self.key.column)?;
        Ok(value
            .to_directory_string()
            .map(|v| (v.clone(), identity([(self.key.attr.clone(), v)]))))
    }

    async fn store(
        &self,
        key_value: &str,
        ident: &Attributes,
        dir: &mut dyn DirectoryConnection,
    ) -> SyncResult<()> {
        let changed = identity([(self.store_attr.clone(), self.store_val.clone())]);
        let delta = self.model.modify(dir, ident, &changed, true).await?;
        if !delta.is_empty() {
            info!("set {}={} for {key_value}", self.store_attr, self.store_val);
        }
        Ok(())
    }

    async fn remaining_rows(
        &self,
        table: &str,
        key_value: &str,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<i64> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = {}",
            quote_qualified_ident(table),
            quote_ident(&self.key.column),
            quote_literal(key_value),
        );
        let rows = run_query(source, &query).await?;
        let count = rows
            .first()
            .and_then(Row::first_value)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                SyncError::query(&query, anyhow::anyhow!("COUNT(*) returned no integer"))
            })?;

        let own = i64::from(self.deleting_row_visible);
        Ok((count - own).max(0))
    }

    async fn unstore_if_unreferenced(
        &self,
        table: &str,
        old_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let Some((key_value, ident)) = self.identity_of(old_row)? else {
            debug!("{} is null, nothing to unset", self.key.column);
            return Ok(());
        };

        let remaining = self.remaining_rows(table, &key_value, source).await?;
        if remaining > 0 {
            debug!("{remaining} other row(s) still reference {key_value}, keeping {}", self.store_attr);
            return Ok(());
        }

        let delta = self
            .model
            .remove_from_attr(dir, &ident, &self.store_attr, &self.store_val)
            .await?;
        if !delta.is_empty() {
            info!("unset {}={} for {key_value}", self.store_attr, self.store_val);
        }
        Ok(())
    }
}

#[async_trait]
impl SyncHandler for StoreIfExistsHandler {
    fn name(&self) -> &'static str {
        "store_if_exists"
    }

    async fn handle_insert(
        &self,
        _table: &str,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        _source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        match self.identity_of(new_row)? {
            Some((key_value, ident)) => self.store(&key_value, &ident, dir).await,
            None => {
                debug!("{} is null, nothing to set", self.key.column);
                Ok(())
            }
        }
    }

    /// Stores on the new key, then unstores the old one if nothing else
    /// references it. Other column changes are ignored.
    async fn handle_update(
        &self,
        table: &str,
        old_row: &Row,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let old_key = required(old_row, &self.key.column)?;
        let new_key = required(new_row, &self.key.column)?;
        if old_key == new_key {
            return Ok(());
        }

        if !new_key.is_null() {
            self.handle_insert(table, new_row, dir, source).await?;
        }
        self.unstore_if_unreferenced(table, old_row, dir, source).await
    }

    async fn handle_delete(
        &self,
        table: &str,
        old_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        self.unstore_if_unreferenced(table, old_row, dir, source).await
    }
}
