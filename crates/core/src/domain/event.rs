use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;

/// Isolation boundary for every store and query operation. Events published
/// under one tenant are never visible to another.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Updated,
    StatusChanged,
}

impl TaskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::StatusChanged => "status_changed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "status_changed" => Some(Self::StatusChanged),
            _ => None,
        }
    }
}

/// Append-only event envelope. The `payload` stays an opaque JSON value so
/// unknown fields written by newer producers round-trip losslessly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: String,
    pub cursor: Cursor,
    pub kind: TaskEventKind,
    pub subject_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl TaskEvent {
    /// Build an event stamped at the given instant. The cursor doubles as
    /// the event id.
    pub fn at(
        occurred_at: DateTime<Utc>,
        kind: TaskEventKind,
        subject_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let cursor = Cursor::at(occurred_at);
        Self {
            id: cursor.as_str().to_string(),
            cursor,
            kind,
            subject_id: subject_id.into(),
            payload,
            occurred_at,
        }
    }

    pub fn new(kind: TaskEventKind, subject_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::at(Utc::now(), kind, subject_id, payload)
    }
}
