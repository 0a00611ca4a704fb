//! Relational source abstraction.
//!
//! Handlers issue auxiliary queries (dynamic attributes, joins, accumulator
//! queries, existence counts) through a [`RelationalSource`]. Inside a
//! trigger this is the database's own SPI; outside it is a client
//! connection, see `dirsync-postgresql-source`.

use crate::error::{SyncError, SyncResult};
use crate::template::{Escape, Template};
use crate::values::Row;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait RelationalSource: Send {
    /// Execute a query and return all result rows.
    async fn execute(&mut self, query: &str) -> Result<Vec<Row>>;
}

/// Execute `query`, wrapping transport failures into [`SyncError::Query`].
pub async fn run_query(source: &mut dyn RelationalSource, query: &str) -> SyncResult<Vec<Row>> {
    debug!("executing: {query}");
    source
        .execute(query)
        .await
        .map_err(|e| SyncError::query(query, e))
}

/// Substitute row columns (and `extra` pairs, which take precedence) into a
/// relational query template.
pub fn render_query(template: &Template, row: &Row, extra: &[(&str, String)]) -> SyncResult<String> {
    template.render(
        |name| {
            extra
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.clone())
                .or_else(|| row.get(name).map(ToString::to_string))
        },
        Escape::None,
    )
}

/// Quote an identifier (`"name"`, embedded quotes doubled).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name (`schema.table`), part by part.
pub fn quote_qualified_ident(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// Quote a string literal (`'value'`, embedded quotes doubled).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::SqlValue;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("o'neil"), "'o''neil'");
        assert_eq!(quote_qualified_ident("public.users"), "\"public\".\"users\"");
    }

    #[test]
    fn test_render_query_from_row_and_extra() {
        let t = Template::parse("SELECT mail FROM alias WHERE user_id = '{id}' AND list = {_foreign_id}")
            .unwrap();
        let row = Row::new().with("id", 1).with("_foreign_id", "shadowed");
        let sql = render_query(&t, &row, &[("_foreign_id", "7".to_string())]).unwrap();
        assert_eq!(
            sql,
            "SELECT mail FROM alias WHERE user_id = '1' AND list = 7"
        );
    }

    #[test]
    fn test_render_query_null_is_sql_null() {
        let t = Template::parse("SELECT 1 WHERE x = {x}").unwrap();
        let row = Row::new().with("x", SqlValue::Null);
        assert_eq!(render_query(&t, &row, &[]).unwrap(), "SELECT 1 WHERE x = NULL");
    }
}
