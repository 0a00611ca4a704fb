//! Handler configuration.
//!
//! Handlers are described as plain data (`type` plus constructor
//! arguments) and only turned into [`SyncHandler`] instances once the
//! whole configuration has been validated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use sync_core::handlers::FOREIGN_ID_PLACEHOLDER;
use sync_core::{
    AccumulateFromQueryHandler, AccumulateHandler, AttributeMap, CopyHandler, DirectoryModel,
    KeyBinding, KeySource, KeysMap, StoreIfExistsHandler, SyncError, SyncHandler, SyncResult,
    Template,
};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Mirror each row into one directory entry.
    Copy {
        model: String,
        #[serde(default)]
        attrs_map: BTreeMap<String, String>,
        #[serde(default)]
        dyn_attrs_map: BTreeMap<String, Template>,
    },

    /// Add/remove one column value per row in a multi-valued attribute.
    Accumulate {
        model: String,
        ldap_field: String,
        /// Defaults to a column named like `ldap_field`
        #[serde(default)]
        value_column: Option<String>,
        keys_map: KeysMap,
    },

    /// Recompute a multi-valued attribute from a query on every event.
    AccumulateFromQuery {
        model: String,
        ldap_field: String,
        sql_request: Template,
        keys_map: KeysMap,
    },

    /// Keep `store_attr=store_val` while any row references the entry.
    StoreIfExists {
        model: String,
        key: KeyBinding,
        store_attr: String,
        store_val: String,
        #[serde(default = "default_true")]
        deleting_row_visible: bool,
    },
}

impl HandlerConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Accumulate { .. } => "accumulate",
            Self::AccumulateFromQuery { .. } => "accumulate_from_query",
            Self::StoreIfExists { .. } => "store_if_exists",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Copy { model, .. }
            | Self::Accumulate { model, .. }
            | Self::AccumulateFromQuery { model, .. }
            | Self::StoreIfExists { model, .. } => model,
        }
    }

    /// Returns the reason the configuration is unusable, if any.
    pub(super) fn validate(&self, models: &BTreeMap<String, DirectoryModel>) -> Result<(), String> {
        if !models.contains_key(self.model()) {
            return Err(format!("unknown model {:?}", self.model()));
        }

        match self {
            Self::Copy { attrs_map, .. } => {
                if attrs_map.is_empty() {
                    return Err("copy handler needs a non-empty attrs_map".to_string());
                }
            }
            Self::Accumulate {
                ldap_field,
                keys_map,
                ..
            } => {
                if ldap_field.is_empty() {
                    return Err("ldap_field is empty".to_string());
                }
                if keys_map.is_empty() {
                    return Err("keys_map is empty".to_string());
                }
            }
            Self::AccumulateFromQuery {
                ldap_field,
                sql_request,
                keys_map,
                ..
            } => {
                if ldap_field.is_empty() {
                    return Err("ldap_field is empty".to_string());
                }
                if keys_map.is_empty() {
                    return Err("keys_map is empty".to_string());
                }
                let has_join = keys_map.values().any(|k| matches!(k, KeySource::Join(_)));
                if !has_join && sql_request.placeholders().any(|p| p == FOREIGN_ID_PLACEHOLDER) {
                    return Err(format!(
                        "sql_request uses {{{FOREIGN_ID_PLACEHOLDER}}} but keys_map has no join"
                    ));
                }
            }
            Self::StoreIfExists {
                store_attr,
                store_val,
                ..
            } => {
                if store_attr.is_empty() || store_val.is_empty() {
                    return Err("store_attr and store_val must be set".to_string());
                }
            }
        }
        Ok(())
    }

    pub(super) fn build(
        &self,
        models: &BTreeMap<&str, Arc<DirectoryModel>>,
    ) -> SyncResult<Arc<dyn SyncHandler>> {
        let model = models
            .get(self.model())
            .cloned()
            .ok_or_else(|| SyncError::InvalidConfig(format!("unknown model {:?}", self.model())))?;

        let handler: Arc<dyn SyncHandler> = match self {
            Self::Copy {
                attrs_map,
                dyn_attrs_map,
                ..
            } => {
                let attributes = AttributeMap {
                    attrs_map: attrs_map.clone(),
                    dyn_attrs_map: dyn_attrs_map.clone(),
                };
                Arc::new(CopyHandler::new(attributes, model))
            }
            Self::Accumulate {
                ldap_field,
                value_column,
                keys_map,
                ..
            } => {
                let mut handler = AccumulateHandler::new(ldap_field, keys_map.clone(), model);
                if let Some(column) = value_column {
                    handler = handler.with_value_column(column);
                }
                Arc::new(handler)
            }
            Self::AccumulateFromQuery {
                ldap_field,
                sql_request,
                keys_map,
                ..
            } => Arc::new(AccumulateFromQueryHandler::new(
                sql_request.clone(),
                ldap_field,
                keys_map.clone(),
                model,
            )),
            Self::StoreIfExists {
                key,
                store_attr,
                store_val,
                deleting_row_visible,
                ..
            } => Arc::new(
                StoreIfExistsHandler::new(key.clone(), store_attr, store_val, model)
                    .with_deleting_row_visible(*deleting_row_visible),
            ),
        };
        Ok(handler)
    }
}
