//! Row → directory attribute mapping.

use crate::diff::{dedup_values, push_unique};
use crate::directory::Attributes;
use crate::error::SyncResult;
use crate::source::{render_query, run_query, RelationalSource};
use crate::template::Template;
use crate::values::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static and dynamic attribute mapping of a Copy handler.
///
/// `attrs_map` maps a directory attribute to a source column.
/// `dyn_attrs_map` maps a directory attribute to a query template whose
/// results are merged into the attribute as extra values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMap {
    #[serde(default)]
    pub attrs_map: BTreeMap<String, String>,
    #[serde(default)]
    pub dyn_attrs_map: BTreeMap<String, Template>,
}

impl AttributeMap {
    pub fn new(attrs_map: BTreeMap<String, String>) -> Self {
        Self {
            attrs_map,
            dyn_attrs_map: BTreeMap::new(),
        }
    }

    pub fn with_dynamic(mut self, attr: impl Into<String>, query: Template) -> Self {
        self.dyn_attrs_map.insert(attr.into(), query);
        self
    }

    /// Map the row through `attrs_map`.
    ///
    /// Columns that are absent or null are omitted rather than mapped to an
    /// empty string.
    pub fn static_attributes(&self, row: &Row) -> Attributes {
        self.attrs_map
            .iter()
            .filter_map(|(attr, column)| {
                row.get(column)
                    .and_then(|value| value.to_directory_string())
                    .map(|value| (attr.clone(), vec![value]))
            })
            .collect()
    }

    /// Run every dynamic query against `row` and merge the results into
    /// `attrs`. A query returning nothing leaves the attribute untouched.
    pub async fn apply_dynamic(
        &self,
        attrs: &mut Attributes,
        row: &Row,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<()> {
        for (attr, template) in &self.dyn_attrs_map {
            let query = render_query(template, row, &[])?;
            let results = run_query(source, &query).await?;
            if results.is_empty() {
                continue;
            }

            let values = attrs.entry(attr.clone()).or_default();
            for result in &results {
                // Prefer the column named like the attribute, fall back to
                // the first column.
                let value = result.get(attr).or_else(|| result.first_value());
                if let Some(value) = value.and_then(|v| v.to_directory_string()) {
                    push_unique(values, &value);
                }
            }
            dedup_values(values);
            if values.is_empty() {
                attrs.remove(attr);
            }
        }
        Ok(())
    }

    /// Static attributes followed by dynamic augmentation.
    pub async fn attributes(
        &self,
        row: &Row,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<Attributes> {
        let mut attrs = self.static_attributes(row);
        self.apply_dynamic(&mut attrs, row, source).await?;
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use crate::values::SqlValue;

    fn user_map() -> AttributeMap {
        AttributeMap::new(
            [("uid", "id"), ("mail", "mail"), ("sn", "mail"), ("cn", "mail")]
                .into_iter()
                .map(|(a, c)| (a.to_string(), c.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_static_mapping_stringifies_and_skips_nulls() {
        let map = AttributeMap::new(
            [("uid", "id"), ("active", "active"), ("mail", "mail"), ("x", "missing")]
                .into_iter()
                .map(|(a, c)| (a.to_string(), c.to_string()))
                .collect(),
        );
        let row = Row::new()
            .with("id", 1)
            .with("active", true)
            .with("mail", SqlValue::Null);
        let attrs = map.static_attributes(&row);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["uid"], vec!["1"]);
        assert_eq!(attrs["active"], vec!["TRUE"]);
    }

    #[tokio::test]
    async fn test_dynamic_values_merge_with_static_values() {
        let map = user_map().with_dynamic(
            "mail",
            Template::parse("SELECT mail FROM alias WHERE user_id = '{id}'").unwrap(),
        );
        let mut source = ScriptedSource::new();
        source.respond(
            "SELECT mail FROM alias WHERE user_id = '1'",
            vec![
                Row::new().with("mail", "alias@alias.tld"),
                Row::new().with("mail", "foo@bar.com"),
            ],
        );

        let row = Row::new().with("id", 1).with("mail", "foo@bar.com");
        let attrs = map.attributes(&row, &mut source).await.unwrap();
        assert_eq!(attrs["mail"], vec!["foo@bar.com", "alias@alias.tld"]);
        assert_eq!(attrs["uid"], vec!["1"]);
        assert_eq!(attrs["cn"], vec!["foo@bar.com"]);
    }

    #[tokio::test]
    async fn test_dynamic_without_results_is_not_an_error() {
        let map = user_map().with_dynamic(
            "mail",
            Template::parse("SELECT mail FROM alias WHERE user_id = '{id}'").unwrap(),
        );
        let mut source = ScriptedSource::new();
        source.respond("SELECT mail FROM alias WHERE user_id = '2'", vec![]);

        let row = Row::new().with("id", 2).with("mail", "bar@bar.com");
        let attrs = map.attributes(&row, &mut source).await.unwrap();
        assert_eq!(attrs["mail"], vec!["bar@bar.com"]);
    }

    #[tokio::test]
    async fn test_dynamic_falls_back_to_first_column() {
        let map = AttributeMap::default().with_dynamic(
            "memberOf",
            Template::parse("SELECT group_dn FROM membership WHERE user_id = {id}").unwrap(),
        );
        let mut source = ScriptedSource::new();
        source.respond(
            "SELECT group_dn FROM membership WHERE user_id = 3",
            vec![
                Row::new().with("group_dn", "cn=a"),
                Row::new().with("group_dn", SqlValue::Null),
                Row::new().with("group_dn", "cn=a"),
            ],
        );
        let attrs = map
            .attributes(&Row::new().with("id", 3), &mut source)
            .await
            .unwrap();
        assert_eq!(attrs["memberOf"], vec!["cn=a"]);
    }
}
