use super::{required, SyncHandler};
use crate::directory::{DirectoryConnection, Modification};
use crate::error::SyncResult;
use crate::join::{resolve_identity, JoinOutcome, KeysMap, ResolvedIdentity};
use crate::model::DirectoryModel;
use crate::source::RelationalSource;
use crate::values::Row;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Accumulates one column of many rows into a multi-valued attribute.
///
/// Every row contributes its `value_column` value to `ldap_field` of the
/// entry identified through `keys_map`. Values are added and removed one at
/// a time so that values contributed by other rows (or other tables) are
/// left alone.
#[derive(Debug, Clone)]
pub struct AccumulateHandler {
    ldap_field: String,
    value_column: String,
    keys_map: KeysMap,
    model: Arc<DirectoryModel>,
}

impl AccumulateHandler {
    /// The accumulated column defaults to a column named like `ldap_field`.
    pub fn new(ldap_field: impl Into<String>, keys_map: KeysMap, model: Arc<DirectoryModel>) -> Self {
        let ldap_field = ldap_field.into();
        Self {
            value_column: ldap_field.clone(),
            ldap_field,
            keys_map,
            model,
        }
    }

    pub fn with_value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = column.into();
        self
    }

    fn value_of(&self, row: &Row) -> SyncResult<Option<String>> {
        Ok(required(row, &self.value_column)?.to_directory_string())
    }

    async fn add_value(
        &self,
        identity: &ResolvedIdentity,
        value: &str,
        dir: &mut dyn DirectoryConnection,
    ) -> SyncResult<()> {
        let entry = self.model.get_existing(dir, &identity.attrs).await?;
        if entry.values(&self.ldap_field).iter().any(|v| v == value) {
            debug!("{} already holds {value} on {}", self.ldap_field, entry.dn);
            return Ok(());
        }
        info!("adding a {} value to {}", self.ldap_field, entry.dn);
        let delta = [Modification::add(&self.ldap_field, vec![value.to_string()])];
        self.model.write_delta(dir, &entry.dn, &delta).await
    }

    async fn remove_value(
        &self,
        identity: &ResolvedIdentity,
        value: &str,
        dir: &mut dyn DirectoryConnection,
    ) -> SyncResult<()> {
        let entry = self.model.get_existing(dir, &identity.attrs).await?;
        if !entry.values(&self.ldap_field).iter().any(|v| v == value) {
            debug!("{} does not hold {value} on {}", self.ldap_field, entry.dn);
            return Ok(());
        }
        info!("removing a {} value from {}", self.ldap_field, entry.dn);
        let delta = [Modification::delete(&self.ldap_field, vec![value.to_string()])];
        self.model.write_delta(dir, &entry.dn, &delta).await
    }

    /// Swap `old` for `new` on one entry in a single modify.
    async fn replace_value(
        &self,
        identity: &ResolvedIdentity,
        old: Option<&str>,
        new: Option<&str>,
        dir: &mut dyn DirectoryConnection,
    ) -> SyncResult<()> {
        let entry = self.model.get_existing(dir, &identity.attrs).await?;
        let mut remaining: Vec<&str> = entry
            .values(&self.ldap_field)
            .iter()
            .map(String::as_str)
            .collect();

        let mut delta = Vec::new();
        if let Some(old) = old {
            if remaining.contains(&old) {
                remaining.retain(|v| *v != old);
                delta.push(Modification::delete(&self.ldap_field, vec![old.to_string()]));
            }
        }
        if let Some(new) = new {
            if !remaining.contains(&new) {
                delta.push(Modification::add(&self.ldap_field, vec![new.to_string()]));
            }
        }

        if !delta.is_empty() {
            info!("modifying a {} value in {}", self.ldap_field, entry.dn);
        }
        self.model.write_delta(dir, &entry.dn, &delta).await
    }
}

#[async_trait]
impl SyncHandler for AccumulateHandler {
    fn name(&self) -> &'static str {
        "accumulate"
    }

    async fn handle_insert(
        &self,
        _table: &str,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let Some(value) = self.value_of(new_row)? else {
            debug!("{} is null, nothing to accumulate", self.value_column);
            return Ok(());
        };
        match resolve_identity(&self.keys_map, new_row, source).await? {
            JoinOutcome::Matched(identity) => self.add_value(&identity, &value, dir).await,
            JoinOutcome::NoMatch => {
                debug!("row does not resolve to a directory entry, skipping");
                Ok(())
            }
        }
    }

    async fn handle_update(
        &self,
        _table: &str,
        old_row: &Row,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let old_value = self.value_of(old_row)?;
        let new_value = self.value_of(new_row)?;
        let old_identity = resolve_identity(&self.keys_map, old_row, source).await?;
        let new_identity = resolve_identity(&self.keys_map, new_row, source).await?;

        match (old_identity, new_identity) {
            (JoinOutcome::Matched(old_id), JoinOutcome::Matched(new_id)) if old_id == new_id => {
                if old_value == new_value {
                    debug!("{} unchanged, skipping", self.value_column);
                    return Ok(());
                }
                self.replace_value(&new_id, old_value.as_deref(), new_value.as_deref(), dir)
                    .await
            }
            (old_id, new_id) => {
                // The row moved to another entry (or in/out of the
                // accumulation): remove from the old one, add to the new one.
                if let (JoinOutcome::Matched(old_id), Some(old_value)) = (old_id, &old_value) {
                    self.remove_value(&old_id, old_value, dir).await?;
                }
                if let (JoinOutcome::Matched(new_id), Some(new_value)) = (new_id, &new_value) {
                    self.add_value(&new_id, new_value, dir).await?;
                }
                Ok(())
            }
        }
    }

    async fn handle_delete(
        &self,
        _table: &str,
        old_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let Some(value) = self.value_of(old_row)? else {
            debug!("{} is null, nothing to remove", self.value_column);
            return Ok(());
        };
        match resolve_identity(&self.keys_map, old_row, source).await? {
            JoinOutcome::Matched(identity) => self.remove_value(&identity, &value, dir).await,
            JoinOutcome::NoMatch => {
                debug!("row does not resolve to a directory entry, skipping");
                Ok(())
            }
        }
    }
}
