//! Change events.
//!
//! One event per committed relational row mutation. Events are consumed
//! exactly once by the handlers bound to their source table and are never
//! persisted.

use crate::error::{SyncError, SyncResult};
use crate::values::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("CREATE"),
            Self::Update => f.write_str("UPDATE"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    /// Accepts trigger vocabulary (`INSERT`) as well as `CREATE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATE" | "INSERT" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(SyncError::UnknownEventKind(s.to_string())),
        }
    }
}

/// A validated change event.
///
/// CREATE carries only `new_row`, DELETE only `old_row`, UPDATE both. The
/// constructors enforce this; the fields stay private so the invariant
/// cannot be broken afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    kind: EventKind,
    old_row: Option<Row>,
    new_row: Option<Row>,
    source_table: String,
}

impl ChangeEvent {
    pub fn create(source_table: impl Into<String>, new_row: Row) -> Self {
        Self {
            kind: EventKind::Create,
            old_row: None,
            new_row: Some(new_row),
            source_table: source_table.into(),
        }
    }

    pub fn update(source_table: impl Into<String>, old_row: Row, new_row: Row) -> Self {
        Self {
            kind: EventKind::Update,
            old_row: Some(old_row),
            new_row: Some(new_row),
            source_table: source_table.into(),
        }
    }

    pub fn delete(source_table: impl Into<String>, old_row: Row) -> Self {
        Self {
            kind: EventKind::Delete,
            old_row: Some(old_row),
            new_row: None,
            source_table: source_table.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    pub fn old_row(&self) -> Option<&Row> {
        self.old_row.as_ref()
    }

    pub fn new_row(&self) -> Option<&Row> {
        self.new_row.as_ref()
    }
}

/// Wire form of a change event, as produced by a trigger dispatcher or read
/// from an event log. The kind is an unchecked string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChangeEvent {
    #[serde(alias = "event")]
    pub kind: String,
    #[serde(default, alias = "old")]
    pub old_row: Option<Row>,
    #[serde(default, alias = "new")]
    pub new_row: Option<Row>,
    #[serde(alias = "table_name", alias = "table")]
    pub source_table: String,
}

impl TryFrom<RawChangeEvent> for ChangeEvent {
    type Error = SyncError;

    fn try_from(raw: RawChangeEvent) -> SyncResult<Self> {
        let kind: EventKind = raw.kind.parse()?;
        let table = raw.source_table;

        let reason = match (kind, raw.old_row, raw.new_row) {
            (EventKind::Create, None, Some(new)) => return Ok(Self::create(table, new)),
            (EventKind::Update, Some(old), Some(new)) => return Ok(Self::update(table, old, new)),
            (EventKind::Delete, Some(old), None) => return Ok(Self::delete(table, old)),
            (EventKind::Create, _, _) => "expected a new row and no old row",
            (EventKind::Update, _, _) => "expected both an old and a new row",
            (EventKind::Delete, _, _) => "expected an old row and no new row",
        };

        Err(SyncError::MalformedEvent {
            kind: kind.to_string(),
            table,
            reason: reason.to_string(),
        })
    }
}

impl From<&ChangeEvent> for RawChangeEvent {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            kind: event.kind.to_string(),
            old_row: event.old_row.clone(),
            new_row: event.new_row.clone(),
            source_table: event.source_table.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str, old: Option<Row>, new: Option<Row>) -> RawChangeEvent {
        RawChangeEvent {
            kind: kind.to_string(),
            old_row: old,
            new_row: new,
            source_table: "users".to_string(),
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("INSERT".parse::<EventKind>().unwrap(), EventKind::Create);
        assert_eq!("create".parse::<EventKind>().unwrap(), EventKind::Create);
        assert_eq!("Update".parse::<EventKind>().unwrap(), EventKind::Update);
        assert_eq!("DELETE".parse::<EventKind>().unwrap(), EventKind::Delete);
        assert!(matches!(
            "TRUNCATE".parse::<EventKind>(),
            Err(SyncError::UnknownEventKind(k)) if k == "TRUNCATE"
        ));
    }

    #[test]
    fn test_raw_events_validate_row_presence() {
        let row = Row::new().with("id", 1);
        assert!(ChangeEvent::try_from(raw("INSERT", None, Some(row.clone()))).is_ok());
        assert!(ChangeEvent::try_from(raw("UPDATE", Some(row.clone()), Some(row.clone()))).is_ok());
        assert!(ChangeEvent::try_from(raw("DELETE", Some(row.clone()), None)).is_ok());

        let err = ChangeEvent::try_from(raw("DELETE", None, Some(row.clone()))).unwrap_err();
        assert!(matches!(err, SyncError::MalformedEvent { .. }));
        let err = ChangeEvent::try_from(raw("UPDATE", Some(row), None)).unwrap_err();
        assert!(matches!(err, SyncError::MalformedEvent { .. }));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = ChangeEvent::try_from(raw("TRUNCATE", None, None)).unwrap_err();
        assert!(matches!(err, SyncError::UnknownEventKind(_)));
    }

    #[test]
    fn test_raw_event_accepts_trigger_field_names() {
        let raw: RawChangeEvent = serde_json::from_str(
            r#"{"event": "INSERT", "table_name": "users", "new": {"id": 1, "mail": "foo@bar.com"}}"#,
        )
        .unwrap();
        let event = ChangeEvent::try_from(raw).unwrap();
        assert_eq!(event.kind(), EventKind::Create);
        assert_eq!(event.source_table(), "users");
        assert!(event.old_row().is_none());
        assert_eq!(event.new_row().unwrap().len(), 2);
    }
}
