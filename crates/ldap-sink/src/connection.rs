use anyhow::{Context, Result};
use async_trait::async_trait;
use ldap3::{Ldap, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use sync_core::{Attributes, DirectoryConnection, DirectoryEntry, ModOp, Modification, SearchScope};
use tracing::trace;

/// A bound `ldap3` handle.
pub struct LdapConnection {
    ldap: Ldap,
}

impl LdapConnection {
    pub fn new(ldap: Ldap) -> Self {
        Self { ldap }
    }
}

fn to_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Attributes in the shape `Ldap::add` expects. Empty attributes are
/// dropped since LDAP rejects attributes without values on add.
fn to_ldap_attrs(attrs: &Attributes) -> Vec<(&str, HashSet<&str>)> {
    attrs
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
        .collect()
}

/// An empty value set on `Delete` removes the whole attribute, on
/// `Replace` it removes all values.
fn to_ldap_mods(delta: &[Modification]) -> Vec<Mod<String>> {
    delta
        .iter()
        .map(|m| {
            let values: HashSet<String> = m.values.iter().cloned().collect();
            match m.op {
                ModOp::Add => Mod::Add(m.attr.clone(), values),
                ModOp::Replace => Mod::Replace(m.attr.clone(), values),
                ModOp::Delete => Mod::Delete(m.attr.clone(), values),
            }
        })
        .collect()
}

fn to_entry(entry: SearchEntry) -> DirectoryEntry {
    DirectoryEntry::new(entry.dn, entry.attrs.into_iter().collect())
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        trace!("LDAP search base={base} filter={filter}");
        let (entries, _res) = self
            .ldap
            .search(base, to_scope(scope), filter, vec!["*"])
            .await
            .with_context(|| format!("LDAP search failed for {filter}"))?
            .success()
            .with_context(|| format!("LDAP search failed for {filter}"))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(to_entry)
            .collect())
    }

    async fn add(&mut self, dn: &str, attrs: &Attributes) -> Result<()> {
        trace!("LDAP add {dn}");
        self.ldap
            .add(dn, to_ldap_attrs(attrs))
            .await
            .with_context(|| format!("Failed to create entry: {dn}"))?
            .success()
            .with_context(|| format!("LDAP add rejected for {dn}"))?;
        Ok(())
    }

    async fn modify(&mut self, dn: &str, delta: &[Modification]) -> Result<()> {
        trace!("LDAP modify {dn}");
        self.ldap
            .modify(dn, to_ldap_mods(delta))
            .await
            .with_context(|| format!("Failed to update entry: {dn}"))?
            .success()
            .with_context(|| format!("LDAP modify rejected for {dn}"))?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        trace!("LDAP delete {dn}");
        self.ldap
            .delete(dn)
            .await
            .with_context(|| format!("Failed to delete entry: {dn}"))?
            .success()
            .with_context(|| format!("LDAP delete rejected for {dn}"))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap.unbind().await.context("LDAP unbind failed")
    }
}
