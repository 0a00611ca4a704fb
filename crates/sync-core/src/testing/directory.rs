//! In-memory directory server.
//!
//! Enforces the write semantics of a real LDAP server that the engine must
//! cope with: adding an existing DN, adding a value that is already present
//! and deleting a value that is not are all errors, and a modify request is
//! applied atomically.

use super::filter::Filter;
use crate::directory::{
    attr_key, Attributes, DirectoryConnection, DirectoryConnector, DirectoryCredentials,
    DirectoryEntry, ModOp, Modification, SearchScope,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A write request as the server received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    Add { dn: String, attrs: Attributes },
    Modify { dn: String, delta: Vec<Modification> },
    Delete { dn: String },
}

impl WriteRecord {
    pub fn dn(&self) -> &str {
        match self {
            WriteRecord::Add { dn, .. }
            | WriteRecord::Modify { dn, .. }
            | WriteRecord::Delete { dn } => dn,
        }
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    /// Keyed by normalized DN.
    entries: BTreeMap<String, DirectoryEntry>,
    writes: Vec<WriteRecord>,
    searches: usize,
    binds: usize,
    unbinds: usize,
    refuse_binds: bool,
    fail_next_write: Option<String>,
}

/// Shared handle on an in-memory directory. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

/// Whether `dn` lies within `scope` of `base`. Both are normalized.
fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    if base.is_empty() {
        return scope == SearchScope::Subtree;
    }
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{base}")),
        SearchScope::OneLevel => dn
            .strip_suffix(base)
            .and_then(|rdn| rdn.strip_suffix(','))
            .is_some_and(|rdn| !rdn.replace("\\,", "").contains(',')),
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without recording a write.
    pub async fn insert_entry(&self, dn: &str, attrs: Attributes) {
        let mut state = self.state.lock().await;
        state
            .entries
            .insert(normalize_dn(dn), DirectoryEntry::new(dn, attrs));
    }

    pub async fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.state.lock().await.entries.get(&normalize_dn(dn)).cloned()
    }

    pub async fn entries(&self) -> Vec<DirectoryEntry> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().await.writes.clone()
    }

    pub async fn search_count(&self) -> usize {
        self.state.lock().await.searches
    }

    pub async fn bind_count(&self) -> usize {
        self.state.lock().await.binds
    }

    pub async fn unbind_count(&self) -> usize {
        self.state.lock().await.unbinds
    }

    /// Make every subsequent bind fail until called with `false`.
    pub async fn refuse_binds(&self, refuse: bool) {
        self.state.lock().await.refuse_binds = refuse;
    }

    /// Make the next write request fail with `message`.
    pub async fn fail_next_write(&self, message: impl Into<String>) {
        self.state.lock().await.fail_next_write = Some(message.into());
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    async fn bind(&self, credentials: &DirectoryCredentials) -> Result<Box<dyn DirectoryConnection>> {
        let mut state = self.state.lock().await;
        if state.refuse_binds {
            bail!("invalid credentials for {}", credentials.bind_dn);
        }
        state.binds += 1;
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
            bound: true,
        }))
    }
}

/// One bound connection to an [`InMemoryDirectory`].
#[derive(Debug)]
pub struct InMemoryConnection {
    state: Arc<Mutex<DirectoryState>>,
    bound: bool,
}

impl InMemoryConnection {
    fn ensure_bound(&self) -> Result<()> {
        if !self.bound {
            bail!("connection already unbound");
        }
        Ok(())
    }
}

fn apply_modification(attrs: &mut Attributes, m: &Modification) -> Result<()> {
    let key = attr_key(attrs, &m.attr).cloned().unwrap_or_else(|| m.attr.clone());
    match m.op {
        ModOp::Add => {
            let values = attrs.entry(key).or_default();
            for value in &m.values {
                if values.contains(value) {
                    bail!("attributeOrValueExists: {}={value}", m.attr);
                }
                values.push(value.clone());
            }
        }
        ModOp::Replace => {
            attrs.insert(key, m.values.clone());
        }
        ModOp::Delete => {
            let values = attrs
                .get_mut(&key)
                .ok_or_else(|| anyhow!("noSuchAttribute: {}", m.attr))?;
            if m.values.is_empty() {
                values.clear();
            }
            for value in &m.values {
                let pos = values
                    .iter()
                    .position(|v| v == value)
                    .ok_or_else(|| anyhow!("noSuchAttribute: {}={value}", m.attr))?;
                values.remove(pos);
            }
        }
    }
    attrs.retain(|_, values| !values.is_empty());
    Ok(())
}

#[async_trait]
impl DirectoryConnection for InMemoryConnection {
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        self.ensure_bound()?;
        let filter = Filter::parse(filter)?;
        let base = normalize_dn(base);
        let mut state = self.state.lock().await;
        state.searches += 1;
        Ok(state
            .entries
            .iter()
            .filter(|(dn, entry)| in_scope(dn, &base, scope) && filter.matches(&entry.attrs))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn add(&mut self, dn: &str, attrs: &Attributes) -> Result<()> {
        self.ensure_bound()?;
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next_write.take() {
            bail!(message);
        }
        let key = normalize_dn(dn);
        if state.entries.contains_key(&key) {
            bail!("entryAlreadyExists: {dn}");
        }
        let mut attrs = attrs.clone();
        attrs.retain(|_, values| !values.is_empty());
        state.writes.push(WriteRecord::Add {
            dn: dn.to_string(),
            attrs: attrs.clone(),
        });
        state.entries.insert(key, DirectoryEntry::new(dn, attrs));
        Ok(())
    }

    async fn modify(&mut self, dn: &str, delta: &[Modification]) -> Result<()> {
        self.ensure_bound()?;
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next_write.take() {
            bail!(message);
        }
        let entry = state
            .entries
            .get_mut(&normalize_dn(dn))
            .ok_or_else(|| anyhow!("noSuchObject: {dn}"))?;

        let mut attrs = entry.attrs.clone();
        for m in delta {
            apply_modification(&mut attrs, m)?;
        }
        entry.attrs = attrs;

        state.writes.push(WriteRecord::Modify {
            dn: dn.to_string(),
            delta: delta.to_vec(),
        });
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        self.ensure_bound()?;
        let mut state = self.state.lock().await;
        if let Some(message) = state.fail_next_write.take() {
            bail!(message);
        }
        if state.entries.remove(&normalize_dn(dn)).is_none() {
            bail!("noSuchObject: {dn}");
        }
        state.writes.push(WriteRecord::Delete { dn: dn.to_string() });
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ensure_bound()?;
        self.bound = false;
        self.state.lock().await.unbinds += 1;
        Ok(())
    }
}
