//! Directory models.
//!
//! A model describes one logical entry type ("the users", "the groups"):
//! how to find an entry (filter template + base), how to name a new one
//! (DN template) and which attributes every entry of the type carries
//! (static attributes, e.g. object classes). Entries are always addressed
//! through the filter, never by a DN supplied by the caller.

use crate::diff::{merge_changes, modify_delta};
use crate::directory::{
    first_value, AttrValues, Attributes, DirectoryConnection, DirectoryEntry, Modification,
    SearchScope,
};
use crate::error::{SyncError, SyncResult, WriteOperation};
use crate::template::{Escape, Template};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryModel {
    /// Search filter template, e.g. `(&(objectClass=inetOrgPerson)(uid={uid}))`
    #[serde(rename = "filter")]
    pub query_template: Template,

    /// Search base
    pub base: String,

    /// DN template for new entries, e.g. `uid={uid},ou=users,dc=foo,dc=bar`
    #[serde(rename = "dn")]
    pub dn_template: Template,

    /// Attributes every entry of this type carries
    #[serde(default)]
    pub static_attrs: Attributes,
}

impl DirectoryModel {
    pub fn new(
        query_template: &str,
        base: impl Into<String>,
        dn_template: &str,
        static_attrs: Attributes,
    ) -> SyncResult<Self> {
        Ok(Self {
            query_template: Template::parse(query_template)?,
            base: base.into(),
            dn_template: Template::parse(dn_template)?,
            static_attrs,
        })
    }

    /// Resolve the search filter for the given identifying attributes.
    pub fn filter_for(&self, identifying: &Attributes) -> SyncResult<String> {
        self.query_template.render(
            |name| first_value(identifying, name).map(str::to_string),
            Escape::Filter,
        )
    }

    /// Resolve the DN a new entry with these attributes would get.
    pub fn dn_for(&self, attrs: &Attributes) -> SyncResult<String> {
        self.dn_template.render(
            |name| {
                first_value(attrs, name)
                    .or_else(|| first_value(&self.static_attrs, name))
                    .map(str::to_string)
            },
            Escape::Dn,
        )
    }

    /// Look up the entry identified by `identifying`.
    ///
    /// `Ok(None)` when nothing matches; absence is a valid state.
    pub async fn get(
        &self,
        conn: &mut dyn DirectoryConnection,
        identifying: &Attributes,
    ) -> SyncResult<Option<DirectoryEntry>> {
        let filter = self.filter_for(identifying)?;
        let mut entries = conn
            .search(&self.base, SearchScope::Subtree, &filter)
            .await
            .map_err(|e| SyncError::DirectoryRead {
                base: self.base.clone(),
                filter: filter.clone(),
                source: e.into(),
            })?;

        match entries.len() {
            0 => Ok(None),
            1 => Ok(entries.pop()),
            count => Err(SyncError::AmbiguousEntry {
                base: self.base.clone(),
                filter,
                count,
            }),
        }
    }

    /// Like [`get`](Self::get) but absence is [`SyncError::NotFound`].
    pub async fn get_existing(
        &self,
        conn: &mut dyn DirectoryConnection,
        identifying: &Attributes,
    ) -> SyncResult<DirectoryEntry> {
        match self.get(conn, identifying).await? {
            Some(entry) => Ok(entry),
            None => Err(SyncError::NotFound {
                base: self.base.clone(),
                filter: self.filter_for(identifying)?,
            }),
        }
    }

    /// Create a new entry. Static attributes are merged in; caller values
    /// win on conflict. Returns the DN of the created entry.
    pub async fn create(
        &self,
        conn: &mut dyn DirectoryConnection,
        attrs: &Attributes,
    ) -> SyncResult<String> {
        let dn = self.dn_for(attrs)?;
        let mut full = self.static_attrs.clone();
        for (attr, values) in attrs {
            if !values.is_empty() {
                full.insert(attr.clone(), values.clone());
            }
        }

        info!("creating {dn}");
        conn.add(&dn, &full)
            .await
            .map_err(|e| SyncError::write(WriteOperation::Add, &dn, e))?;
        Ok(dn)
    }

    /// Delete the entry identified by `identifying`. Not idempotent: a
    /// missing entry is [`SyncError::NotFound`].
    pub async fn delete(
        &self,
        conn: &mut dyn DirectoryConnection,
        identifying: &Attributes,
    ) -> SyncResult<()> {
        let entry = self.get_existing(conn, identifying).await?;
        info!("deleting {}", entry.dn);
        conn.delete(&entry.dn)
            .await
            .map_err(|e| SyncError::write(WriteOperation::Delete, &entry.dn, e))
    }

    /// Modify the entry identified by `identifying`.
    ///
    /// Reads the current attributes, merges `changed` into a copy (override
    /// or accumulate, see [`merge_changes`]) and writes only the minimal
    /// delta. Returns the delta that was applied (empty when nothing changed).
    pub async fn modify(
        &self,
        conn: &mut dyn DirectoryConnection,
        identifying: &Attributes,
        changed: &Attributes,
        accumulate: bool,
    ) -> SyncResult<Vec<Modification>> {
        let entry = self.get_existing(conn, identifying).await?;
        let new_attrs = merge_changes(&entry.attrs, changed, accumulate);
        let delta = modify_delta(&entry.attrs, &new_attrs);
        self.write_delta(conn, &entry.dn, &delta).await?;
        Ok(delta)
    }

    /// Remove one value from a multi-valued attribute. A value that is not
    /// present is a no-op.
    pub async fn remove_from_attr(
        &self,
        conn: &mut dyn DirectoryConnection,
        identifying: &Attributes,
        attr: &str,
        value: &str,
    ) -> SyncResult<Vec<Modification>> {
        let entry = self.get_existing(conn, identifying).await?;
        let delta = if entry.values(attr).iter().any(|v| v == value) {
            vec![Modification::delete(attr, vec![value.to_string()])]
        } else {
            debug!("{attr}={value} not present on {}, nothing to remove", entry.dn);
            Vec::new()
        };
        self.write_delta(conn, &entry.dn, &delta).await?;
        Ok(delta)
    }

    /// Write a precomputed delta to `dn`; an empty delta issues no request.
    pub async fn write_delta(
        &self,
        conn: &mut dyn DirectoryConnection,
        dn: &str,
        delta: &[Modification],
    ) -> SyncResult<()> {
        if delta.is_empty() {
            debug!("no directory change for {dn}");
            return Ok(());
        }
        for modification in delta {
            debug!("{dn}: {modification}");
        }
        info!("updating {dn}");
        conn.modify(dn, delta)
            .await
            .map_err(|e| SyncError::write(WriteOperation::Modify, dn, e))
    }
}

/// Identifying attributes from `(attr, value)` pairs.
pub fn identity<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(attr, value)| (attr.into(), AttrValues::from([value.into()])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::attributes;

    fn users() -> DirectoryModel {
        DirectoryModel::new(
            "(&(objectClass=inetOrgPerson)(uid={uid}))",
            "ou=users,dc=foo,dc=bar",
            "uid={uid},ou=users,dc=foo,dc=bar",
            attributes([("objectClass", vec!["top", "inetOrgPerson"])]),
        )
        .unwrap()
    }

    #[test]
    fn test_filter_uses_first_value_and_escapes() {
        let model = users();
        let ident = attributes([("uid", vec!["a*b", "ignored"])]);
        assert_eq!(
            model.filter_for(&ident).unwrap(),
            "(&(objectClass=inetOrgPerson)(uid=a\\2ab))"
        );
    }

    #[test]
    fn test_dn_escapes_values() {
        let model = users();
        let ident = identity([("uid", "doe,jane")]);
        assert_eq!(
            model.dn_for(&ident).unwrap(),
            "uid=doe\\,jane,ou=users,dc=foo,dc=bar"
        );
    }

    #[test]
    fn test_model_deserializes_from_config() {
        let model: DirectoryModel = serde_json::from_value(serde_json::json!({
            "filter": "(uid={uid})",
            "base": "ou=users,dc=foo,dc=bar",
            "dn": "uid={uid},ou=users,dc=foo,dc=bar",
            "static_attrs": {"objectClass": ["top"]}
        }))
        .unwrap();
        assert_eq!(model.query_template.as_str(), "(uid={uid})");
        assert_eq!(model.static_attrs["objectClass"], vec!["top"]);
    }
}
