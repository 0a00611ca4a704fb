//! PostgreSQL client utilities

use crate::value::convert_postgres_row;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sync_core::{RelationalSource, Row};
use tokio_postgres::{Client, NoTls};
use tracing::{error, trace};

/// Create a new PostgreSQL client with connection handling
pub async fn new_postgresql_client(connection_string: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
        .await
        .context("Failed to connect to PostgreSQL")?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {e}");
        }
    });

    Ok(client)
}

/// Runs engine queries on one PostgreSQL connection.
pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(connection_string: &str) -> Result<Self> {
        Ok(Self::new(new_postgresql_client(connection_string).await?))
    }
}

#[async_trait]
impl RelationalSource for PostgresSource {
    async fn execute(&mut self, query: &str) -> Result<Vec<Row>> {
        let rows = self.client.query(query, &[]).await?;
        trace!("{} row(s) for {query}", rows.len());
        rows.iter().map(convert_postgres_row).collect()
    }
}
