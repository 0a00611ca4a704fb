use super::SyncHandler;
use crate::attribute_map::AttributeMap;
use crate::directory::{Attributes, DirectoryConnection};
use crate::error::SyncResult;
use crate::model::DirectoryModel;
use crate::source::RelationalSource;
use crate::values::Row;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Keeps one directory entry in sync with one relational row.
#[derive(Debug, Clone)]
pub struct CopyHandler {
    attributes: AttributeMap,
    model: Arc<DirectoryModel>,
}

impl CopyHandler {
    pub fn new(attributes: AttributeMap, model: Arc<DirectoryModel>) -> Self {
        Self { attributes, model }
    }

    pub fn model(&self) -> &DirectoryModel {
        &self.model
    }
}

#[async_trait]
impl SyncHandler for CopyHandler {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn handle_insert(
        &self,
        _table: &str,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let attrs = self.attributes.attributes(new_row, source).await?;
        self.model.create(dir, &attrs).await?;
        Ok(())
    }

    async fn handle_update(
        &self,
        _table: &str,
        old_row: &Row,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let old_attrs = self.attributes.static_attributes(old_row);
        let mut new_attrs = self.attributes.static_attributes(new_row);

        // Column changes outside the mapping must not touch the directory.
        if old_attrs == new_attrs {
            debug!("update does not affect mapped attributes, skipping");
            return Ok(());
        }

        self.attributes
            .apply_dynamic(&mut new_attrs, new_row, source)
            .await?;

        let mut changed: Attributes = new_attrs;
        for attr in old_attrs.keys() {
            changed.entry(attr.clone()).or_default();
        }

        // The entry is still reachable through its old identifying values.
        self.model.modify(dir, &old_attrs, &changed, false).await?;
        Ok(())
    }

    async fn handle_delete(
        &self,
        _table: &str,
        old_row: &Row,
        dir: &mut dyn DirectoryConnection,
        _source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let attrs = self.attributes.static_attributes(old_row);
        self.model.delete(dir, &attrs).await
    }
}
