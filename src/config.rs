//! Configuration file loading.
//!
//! A configuration names the directory to write to, the relational source
//! to query, the directory models and the table → handler bindings. It is
//! loaded once at startup and never changes afterwards.
//!
//! ```yaml
//! directory:
//!   url: ldap://localhost:389
//!   bind_dn: cn=admin,dc=foo,dc=bar
//!   bind_password: password
//! source:
//!   connection_string: host=localhost user=postgres dbname=app
//! models:
//!   users:
//!     filter: "(&(objectClass=inetOrgPerson)(uid={uid}))"
//!     base: ou=users,dc=foo,dc=bar
//!     dn: uid={uid},ou=users,dc=foo,dc=bar
//!     static_attrs: { objectClass: [top, inetOrgPerson] }
//! bindings:
//!   - table: users
//!     handler:
//!       type: copy
//!       model: users
//!       attrs_map: { uid: id, mail: mail }
//! ```

mod handler;

pub use handler::HandlerConfig;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use sync_core::{Binding, DirectoryCredentials, DirectoryModel, SyncError, SyncResult};

/// Relational source connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// libpq-style connection string or URI
    #[serde(default)]
    pub connection_string: Option<String>,
}

/// One table → handler binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub table: String,
    pub handler: HandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub directory: DirectoryCredentials,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub models: BTreeMap<String, DirectoryModel>,

    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

impl SyncConfig {
    /// Load and validate a configuration file. `.toml` files are parsed as
    /// TOML, everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_yaml_str(&content),
        };
        config.with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse configuration YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross references that deserialization alone cannot.
    pub fn validate(&self) -> SyncResult<()> {
        if self.directory.url.is_empty() {
            return Err(SyncError::InvalidConfig("directory.url is empty".to_string()));
        }
        for (index, binding) in self.bindings.iter().enumerate() {
            if binding.table.is_empty() {
                return Err(SyncError::InvalidConfig(format!(
                    "bindings[{index}]: table is empty"
                )));
            }
            binding
                .handler
                .validate(&self.models)
                .map_err(|reason| {
                    SyncError::InvalidConfig(format!(
                        "bindings[{index}] ({}): {reason}",
                        binding.table
                    ))
                })?;
        }
        Ok(())
    }

    /// Construct the handler of every binding, in configuration order.
    pub fn build_bindings(&self) -> SyncResult<Vec<Binding>> {
        let models: BTreeMap<&str, Arc<DirectoryModel>> = self
            .models
            .iter()
            .map(|(name, model)| (name.as_str(), Arc::new(model.clone())))
            .collect();

        self.bindings
            .iter()
            .map(|binding| {
                let handler = binding.handler.build(&models)?;
                Ok(Binding::new(binding.table.clone(), handler))
            })
            .collect()
    }

    /// Tables with at least one binding, deduplicated, in configuration order.
    pub fn bound_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for binding in &self.bindings {
            if !tables.contains(&binding.table.as_str()) {
                tables.push(&binding.table);
            }
        }
        tables
    }

    pub fn connection_string(&self) -> Result<&str> {
        match self.source.connection_string.as_deref() {
            Some(s) if !s.is_empty() => Ok(s),
            _ => bail!("no relational source configured: set source.connection_string or pass --source-uri"),
        }
    }
}
