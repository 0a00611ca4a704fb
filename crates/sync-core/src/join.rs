//! Join resolution for accumulator identities.
//!
//! An accumulator needs the identifying attribute(s) of the directory entry
//! it writes to. Sometimes the firing row carries them directly; sometimes
//! they live one relational hop away (e.g. a mail alias row only knows the
//! id of its owner, whose `uid` lives in the users table).

use crate::directory::Attributes;
use crate::error::{SyncError, SyncResult};
use crate::source::{quote_ident, quote_literal, run_query, RelationalSource};
use crate::values::{Row, SqlValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One-hop join describing where an identifying value lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Table holding the identifying value
    pub foreign_table: String,
    /// Column of `foreign_table` holding the identifying value
    pub foreign_field: String,
    /// `(local_column, foreign_column)` join condition
    pub join: (String, String),
}

impl JoinSpec {
    pub fn new(
        foreign_table: impl Into<String>,
        foreign_field: impl Into<String>,
        local_column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            foreign_table: foreign_table.into(),
            foreign_field: foreign_field.into(),
            join: (local_column.into(), foreign_column.into()),
        }
    }

    pub fn local_column(&self) -> &str {
        &self.join.0
    }

    pub fn foreign_column(&self) -> &str {
        &self.join.1
    }

    fn lookup_query(&self, local_value: &SqlValue) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = {}",
            quote_ident(&self.foreign_field),
            quote_ident(&self.foreign_table),
            quote_ident(self.foreign_column()),
            quote_literal(&local_value.to_string()),
        )
    }
}

/// Where the value of one identifying attribute comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySource {
    /// A column of the firing row.
    DirectColumn(String),
    /// A column of another table, reached through a join.
    Join(JoinSpec),
}

impl From<&str> for KeySource {
    fn from(column: &str) -> Self {
        Self::DirectColumn(column.to_string())
    }
}

impl From<JoinSpec> for KeySource {
    fn from(spec: JoinSpec) -> Self {
        Self::Join(spec)
    }
}

/// Directory attribute → key source.
pub type KeysMap = BTreeMap<String, KeySource>;

/// Result of a resolution that may legitimately find nothing.
///
/// `NoMatch` means the event does not apply to any directory entry and the
/// handler must skip it; it is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome<T = SqlValue> {
    Matched(T),
    NoMatch,
}

impl<T> JoinOutcome<T> {
    pub fn matched(self) -> Option<T> {
        match self {
            Self::Matched(value) => Some(value),
            Self::NoMatch => None,
        }
    }
}

/// Resolve `spec` for `row`.
///
/// A null local column short-circuits to `NoMatch` without querying. When
/// the lookup returns several rows the first one wins: this is an existence
/// join, not a uniqueness check.
pub async fn resolve_join(
    row: &Row,
    spec: &JoinSpec,
    source: &mut dyn RelationalSource,
) -> SyncResult<JoinOutcome> {
    let local = row
        .get(spec.local_column())
        .ok_or_else(|| SyncError::MissingColumn {
            column: spec.local_column().to_string(),
        })?;
    if local.is_null() {
        debug!("{} is null, no join lookup", spec.local_column());
        return Ok(JoinOutcome::NoMatch);
    }

    let query = spec.lookup_query(local);
    let rows = run_query(source, &query).await?;
    let value = rows
        .first()
        .and_then(|first| first.get(&spec.foreign_field).or_else(|| first.first_value()))
        .filter(|value| !value.is_null());

    match value {
        Some(value) => Ok(JoinOutcome::Matched(value.clone())),
        None => {
            debug!("no {} row matches {query}", spec.foreign_table);
            Ok(JoinOutcome::NoMatch)
        }
    }
}

/// Identifying attributes of the entry an accumulator writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub attrs: Attributes,
    /// Value resolved by the first join key, if any key is a join.
    pub foreign_id: Option<String>,
}

/// Resolve every key of `keys_map` against `row`.
///
/// A null direct column, a null join column or an empty join lookup all
/// yield `NoMatch`: the row does not participate in the accumulation.
pub async fn resolve_identity(
    keys_map: &KeysMap,
    row: &Row,
    source: &mut dyn RelationalSource,
) -> SyncResult<JoinOutcome<ResolvedIdentity>> {
    let mut attrs = Attributes::new();
    let mut foreign_id = None;

    for (attr, key) in keys_map {
        let value = match key {
            KeySource::DirectColumn(column) => {
                let value = row.get(column).ok_or_else(|| SyncError::MissingColumn {
                    column: column.clone(),
                })?;
                if value.is_null() {
                    debug!("{column} is null, row does not identify an entry");
                    return Ok(JoinOutcome::NoMatch);
                }
                value.clone()
            }
            KeySource::Join(spec) => match resolve_join(row, spec, source).await? {
                JoinOutcome::Matched(value) => {
                    if foreign_id.is_none() {
                        foreign_id = Some(value.to_string());
                    }
                    value
                }
                JoinOutcome::NoMatch => return Ok(JoinOutcome::NoMatch),
            },
        };
        attrs.insert(attr.clone(), vec![value.to_string()]);
    }

    Ok(JoinOutcome::Matched(ResolvedIdentity { attrs, foreign_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    fn owner_join() -> JoinSpec {
        JoinSpec::new("users", "login", "owner_id", "id")
    }

    #[tokio::test]
    async fn test_null_local_column_skips_lookup() {
        let mut source = ScriptedSource::new();
        let row = Row::new().with("owner_id", SqlValue::Null);
        let outcome = resolve_join(&row, &owner_join(), &mut source).await.unwrap();
        assert_eq!(outcome, JoinOutcome::NoMatch);
        assert!(source.executed().is_empty());
    }

    #[tokio::test]
    async fn test_empty_lookup_is_no_match() {
        let mut source = ScriptedSource::new();
        source.respond(
            "SELECT \"login\" FROM \"users\" WHERE \"id\" = '9'",
            vec![],
        );
        let row = Row::new().with("owner_id", 9);
        let outcome = resolve_join(&row, &owner_join(), &mut source).await.unwrap();
        assert_eq!(outcome, JoinOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_first_row_wins() {
        let mut source = ScriptedSource::new();
        source.respond(
            "SELECT \"login\" FROM \"users\" WHERE \"id\" = '1'",
            vec![
                Row::new().with("login", "jdoe"),
                Row::new().with("login", "other"),
            ],
        );
        let row = Row::new().with("owner_id", 1);
        let outcome = resolve_join(&row, &owner_join(), &mut source).await.unwrap();
        assert_eq!(outcome, JoinOutcome::Matched(SqlValue::from("jdoe")));
    }

    #[tokio::test]
    async fn test_missing_local_column_is_an_error() {
        let mut source = ScriptedSource::new();
        let row = Row::new().with("id", 1);
        let err = resolve_join(&row, &owner_join(), &mut source)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingColumn { .. }));
    }

    #[tokio::test]
    async fn test_identity_mixes_direct_and_joined_keys() {
        let mut source = ScriptedSource::new();
        source.respond(
            "SELECT \"login\" FROM \"users\" WHERE \"id\" = '1'",
            vec![Row::new().with("login", "jdoe")],
        );
        let mut keys = KeysMap::new();
        keys.insert("uid".to_string(), owner_join().into());
        keys.insert("o".to_string(), "org".into());

        let row = Row::new().with("owner_id", 1).with("org", "acme");
        let identity = resolve_identity(&keys, &row, &mut source)
            .await
            .unwrap()
            .matched()
            .unwrap();
        assert_eq!(identity.attrs["uid"], vec!["jdoe"]);
        assert_eq!(identity.attrs["o"], vec!["acme"]);
        assert_eq!(identity.foreign_id.as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_key_source_deserializes_both_forms() {
        let keys: KeysMap = serde_json::from_value(serde_json::json!({
            "uid": "login",
            "mail": {
                "foreign_table": "users",
                "foreign_field": "login",
                "join": ["owner_id", "id"]
            }
        }))
        .unwrap();
        assert_eq!(keys["uid"], KeySource::DirectColumn("login".to_string()));
        assert_eq!(keys["mail"], KeySource::Join(owner_join()));
    }
}
