//! Directory transport abstraction.
//!
//! The engine never talks to a concrete directory server. It is handed a
//! [`DirectoryConnector`] and opens one [`DirectoryConnection`] per handler
//! invocation. `dirsync-ldap-sink` implements these traits on top of
//! `ldap3`; [`crate::testing::InMemoryDirectory`] implements them in memory.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Values of one directory attribute.
///
/// Always a sequence, even for single-valued attributes. Values are kept in
/// insertion order and never contain duplicates.
pub type AttrValues = Vec<String>;

/// Attribute name → values.
pub type Attributes = BTreeMap<String, AttrValues>;

/// Build an [`Attributes`] map from `(name, [values])` pairs.
pub fn attributes<I, K, V, S>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: IntoIterator<Item = S>,
    S: Into<String>,
{
    pairs
        .into_iter()
        .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
        .collect()
}

/// Stored key of attribute `name`. Attribute names are case-insensitive,
/// an exact match wins over a folded one.
pub fn attr_key<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a String> {
    attrs
        .get_key_value(name)
        .or_else(|| attrs.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)))
        .map(|(key, _)| key)
}

/// Values of attribute `name`, looked up case-insensitively.
pub fn attr_values<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a AttrValues> {
    attr_key(attrs, name).and_then(|key| attrs.get(key))
}

/// First value of an attribute, for call sites that need a scalar.
pub fn first_value<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a str> {
    attr_values(attrs, name)
        .and_then(|values| values.first())
        .map(String::as_str)
}

/// A directory entry as returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: Attributes,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>, attrs: Attributes) -> Self {
        Self {
            dn: dn.into(),
            attrs,
        }
    }

    /// Values of an attribute, empty when the attribute is absent.
    pub fn values(&self, attr: &str) -> &[String] {
        attr_values(&self.attrs, attr)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Search scope. Models always search subtrees; the other scopes exist for
/// transports and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

/// Kind of one attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModOp {
    /// Add the listed values (creating the attribute if needed).
    Add,
    /// Replace all values with the listed ones; an empty list removes the
    /// attribute.
    Replace,
    /// Remove the listed values; an empty list removes the attribute.
    Delete,
}

/// One `(operation, attribute, values)` triple of a modify delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub op: ModOp,
    pub attr: String,
    pub values: AttrValues,
}

impl Modification {
    pub fn add(attr: impl Into<String>, values: AttrValues) -> Self {
        Self {
            op: ModOp::Add,
            attr: attr.into(),
            values,
        }
    }

    pub fn replace(attr: impl Into<String>, values: AttrValues) -> Self {
        Self {
            op: ModOp::Replace,
            attr: attr.into(),
            values,
        }
    }

    pub fn delete(attr: impl Into<String>, values: AttrValues) -> Self {
        Self {
            op: ModOp::Delete,
            attr: attr.into(),
            values,
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            ModOp::Add => "add",
            ModOp::Replace => "replace",
            ModOp::Delete => "delete",
        };
        write!(f, "{op} {}: {:?}", self.attr, self.values)
    }
}

/// Credentials used to bind a directory connection.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryCredentials {
    /// Server URL, e.g. `ldap://localhost:389`
    pub url: String,
    /// DN to bind as
    pub bind_dn: String,
    /// Bind password
    #[serde(default)]
    pub bind_password: String,
}

impl fmt::Debug for DirectoryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryCredentials")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<redacted>")
            .finish()
    }
}

/// Opens bound directory connections.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connect and bind with the given credentials.
    async fn bind(&self, credentials: &DirectoryCredentials)
        -> Result<Box<dyn DirectoryConnection>>;
}

/// A bound directory connection, exclusively owned by one event's handling.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Search `base` with `scope` for entries matching `filter`.
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>>;

    /// Add a new entry.
    async fn add(&mut self, dn: &str, attrs: &Attributes) -> Result<()>;

    /// Apply a delta to an existing entry in one operation.
    async fn modify(&mut self, dn: &str, delta: &[Modification]) -> Result<()>;

    /// Delete an entry.
    async fn delete(&mut self, dn: &str) -> Result<()>;

    /// Release the connection.
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_fold_case() {
        let entry = DirectoryEntry::new(
            "cn=staff,ou=groups,dc=foo,dc=bar",
            attributes([("memberOf", vec!["cn=a"]), ("cn", vec!["staff"])]),
        );
        assert_eq!(entry.values("memberof"), ["cn=a"]);
        assert_eq!(entry.values("MEMBEROF"), ["cn=a"]);
        assert_eq!(first_value(&entry.attrs, "CN"), Some("staff"));
        assert!(entry.values("member").is_empty());
    }

    #[test]
    fn test_exact_attribute_name_wins() {
        let attrs = attributes([("Mail", vec!["folded"]), ("mail", vec!["exact"])]);
        assert_eq!(attr_key(&attrs, "mail").map(String::as_str), Some("mail"));
        assert_eq!(attr_key(&attrs, "MAIL").map(String::as_str), Some("Mail"));
    }
}
