//! dirsync library
//!
//! Keeps an LDAP directory in step with a relational database: every row
//! change on a bound table is turned into the matching directory mutation
//! by the `sync-core` engine.
//!
//! # Crates
//!
//! - `sync_core` - the engine (models, handlers, dispatcher)
//! - `dirsync_ldap_sink` - LDAP transport over `ldap3`
//! - `dirsync_postgresql_source` - relational source over `tokio-postgres`
//!
//! # CLI Usage
//!
//! ```bash
//! # Replay captured change events
//! dirsync apply --config dirsync.yaml --events events.jsonl
//!
//! # Backfill the directory from existing rows
//! dirsync initial-sync --config dirsync.yaml --table users --table aliases
//!
//! # Validate a configuration
//! dirsync check --config dirsync.yaml
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

pub mod config;
pub mod initial_sync;
pub mod replay;

pub use config::{BindingConfig, HandlerConfig, SourceConfig, SyncConfig};

#[derive(Parser, Clone, Debug)]
pub struct ConfigOpts {
    /// Configuration file (YAML, or TOML with a .toml extension)
    #[arg(long, short, env = "DIRSYNC_CONFIG")]
    pub config: PathBuf,

    /// Directory bind password, overrides directory.bind_password
    #[arg(long, env = "DIRSYNC_BIND_PASSWORD", hide_env_values = true)]
    pub bind_password: Option<String>,

    /// Relational connection string, overrides source.connection_string
    #[arg(long, env = "DIRSYNC_SOURCE_URI", hide_env_values = true)]
    pub source_uri: Option<String>,
}

impl ConfigOpts {
    /// Load the configuration file and apply command-line overrides.
    pub fn load(&self) -> anyhow::Result<SyncConfig> {
        let mut config = SyncConfig::from_file(&self.config)
            .with_context(|| format!("Failed to load {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut SyncConfig) {
        if let Some(password) = &self.bind_password {
            config.directory.bind_password = password.clone();
        }
        if let Some(uri) = &self.source_uri {
            config.source.connection_string = Some(uri.clone());
        }
    }
}
