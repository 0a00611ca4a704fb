use crate::source::RelationalSource;
use crate::values::Row;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};

/// Relational source answering exact query strings with scripted rows.
///
/// Responses for one query are consumed in order; the last one is sticky.
/// An unscripted query is an error, so tests notice any query they did not
/// expect.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    responses: HashMap<String, VecDeque<Vec<Row>>>,
    executed: Vec<String>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, query: impl Into<String>, rows: Vec<Row>) -> &mut Self {
        self.responses.entry(query.into()).or_default().push_back(rows);
        self
    }

    /// Every query executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

#[async_trait]
impl RelationalSource for ScriptedSource {
    async fn execute(&mut self, query: &str) -> Result<Vec<Row>> {
        self.executed.push(query.to_string());
        let Some(queue) = self.responses.get_mut(query) else {
            bail!("no scripted response for query: {query}");
        };
        let rows = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(rows.unwrap_or_default())
    }
}
