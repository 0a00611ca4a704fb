use super::SyncHandler;
use crate::diff::{attribute_delta, push_unique};
use crate::directory::DirectoryConnection;
use crate::error::SyncResult;
use crate::join::{resolve_identity, JoinOutcome, KeysMap, ResolvedIdentity};
use crate::model::DirectoryModel;
use crate::source::{render_query, run_query, RelationalSource};
use crate::template::Template;
use crate::values::Row;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Placeholder holding the value resolved by the first join key.
pub const FOREIGN_ID_PLACEHOLDER: &str = "_foreign_id";

/// Recomputes a multi-valued attribute from a query on every event.
///
/// Not incremental: each touching event re-runs `sql_request` and writes
/// the difference between the directory's current values and the full
/// result set. The template sees the row's columns plus `{_foreign_id}`
/// when `keys_map` uses a join.
#[derive(Debug, Clone)]
pub struct AccumulateFromQueryHandler {
    sql_request: Template,
    ldap_field: String,
    keys_map: KeysMap,
    model: Arc<DirectoryModel>,
}

impl AccumulateFromQueryHandler {
    pub fn new(
        sql_request: Template,
        ldap_field: impl Into<String>,
        keys_map: KeysMap,
        model: Arc<DirectoryModel>,
    ) -> Self {
        Self {
            sql_request,
            ldap_field: ldap_field.into(),
            keys_map,
            model,
        }
    }

    async fn recompute(
        &self,
        identity: &ResolvedIdentity,
        row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let extra: Vec<(&str, String)> = identity
            .foreign_id
            .iter()
            .map(|id| (FOREIGN_ID_PLACEHOLDER, id.clone()))
            .collect();
        let query = render_query(&self.sql_request, row, &extra)?;

        let mut values = Vec::new();
        for result in run_query(source, &query).await? {
            if let Some(value) = result.first_value().and_then(|v| v.to_directory_string()) {
                push_unique(&mut values, &value);
            }
        }

        let entry = self.model.get_existing(dir, &identity.attrs).await?;
        let delta = attribute_delta(&self.ldap_field, entry.values(&self.ldap_field), &values);
        if !delta.is_empty() {
            info!("setting {} values of {}", self.ldap_field, entry.dn);
        }
        self.model.write_delta(dir, &entry.dn, &delta).await
    }

    async fn recompute_row(
        &self,
        row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        match resolve_identity(&self.keys_map, row, source).await? {
            JoinOutcome::Matched(identity) => self.recompute(&identity, row, dir, source).await,
            JoinOutcome::NoMatch => {
                debug!("row does not resolve to a directory entry, skipping");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SyncHandler for AccumulateFromQueryHandler {
    fn name(&self) -> &'static str {
        "accumulate_from_query"
    }

    async fn handle_insert(
        &self,
        _table: &str,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        self.recompute_row(new_row, dir, source).await
    }

    async fn handle_update(
        &self,
        _table: &str,
        old_row: &Row,
        new_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        let new_identity = resolve_identity(&self.keys_map, new_row, source).await?;
        if let JoinOutcome::Matched(identity) = &new_identity {
            self.recompute(identity, new_row, dir, source).await?;
        } else {
            debug!("new row does not resolve to a directory entry");
        }

        // A row that moved away from an entry must also stop contributing to it.
        if let JoinOutcome::Matched(old_identity) =
            resolve_identity(&self.keys_map, old_row, source).await?
        {
            if new_identity.matched().as_ref() != Some(&old_identity) {
                self.recompute(&old_identity, old_row, dir, source).await?;
            }
        }
        Ok(())
    }

    async fn handle_delete(
        &self,
        _table: &str,
        old_row: &Row,
        dir: &mut dyn DirectoryConnection,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        self.recompute_row(old_row, dir, source).await
    }
}
