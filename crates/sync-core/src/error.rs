//! Error taxonomy of the synchronization engine.
//!
//! Every variant propagates to the dispatcher unchanged; the engine performs
//! no local recovery. Join resolution misses are not errors, see
//! [`crate::join::JoinOutcome`].

use std::fmt;

/// Boxed transport error carried as the `source` of engine errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the engine.
pub type SyncResult<T> = Result<T, SyncError>;

/// Directory write operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Add,
    Modify,
    Delete,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Modify => f.write_str("modify"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A modify/delete targeted an entry that does not exist.
    #[error("no directory entry matches {filter} under {base}")]
    NotFound { base: String, filter: String },

    /// A model filter matched more than one entry.
    #[error("{count} directory entries match {filter} under {base}, expected at most one")]
    AmbiguousEntry {
        base: String,
        filter: String,
        count: usize,
    },

    /// The dispatcher received an event kind outside CREATE/UPDATE/DELETE.
    #[error("unknown change event kind: {0}")]
    UnknownEventKind(String),

    /// Row presence does not match the event kind.
    #[error("malformed {kind} event on table {table}: {reason}")]
    MalformedEvent {
        kind: String,
        table: String,
        reason: String,
    },

    /// Transport failure while writing to the directory.
    #[error("directory {operation} failed for {dn}")]
    DirectoryWrite {
        operation: WriteOperation,
        dn: String,
        #[source]
        source: BoxError,
    },

    /// Transport failure while searching the directory.
    #[error("directory search failed for {filter} under {base}")]
    DirectoryRead {
        base: String,
        filter: String,
        #[source]
        source: BoxError,
    },

    /// Opening the directory connection failed.
    #[error("directory bind failed for {bind_dn} at {url}")]
    Bind {
        url: String,
        bind_dn: String,
        #[source]
        source: BoxError,
    },

    /// Relational query failure.
    #[error("relational query failed: {query}")]
    Query {
        query: String,
        #[source]
        source: BoxError,
    },

    /// A handler needs a column the row does not carry.
    #[error("column {column} is missing from the row")]
    MissingColumn { column: String },

    /// A template could not be parsed.
    #[error("invalid template {template:?}: {reason}")]
    Template { template: String, reason: String },

    /// A template placeholder has no value to substitute.
    #[error("no value for placeholder {{{name}}} in template {template:?}")]
    MissingTemplateValue { template: String, name: String },

    /// Handler or model configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    pub(crate) fn write(operation: WriteOperation, dn: &str, source: anyhow::Error) -> Self {
        Self::DirectoryWrite {
            operation,
            dn: dn.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn query(query: &str, source: anyhow::Error) -> Self {
        Self::Query {
            query: query.to_string(),
            source: source.into(),
        }
    }

    /// Whether the error means the targeted entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
