use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Accepted,
    Rejected,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(Self::Open),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Canonical CRM-lite task record. The relational row is the source of
/// truth; the event log only mirrors changes to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub title: String,
    pub detail: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self.status, next),
            (TaskStatus::Open, TaskStatus::Accepted)
                | (TaskStatus::Open, TaskStatus::Rejected)
                | (TaskStatus::Accepted, TaskStatus::Done)
        )
    }

    pub fn transition_to(&mut self, next: TaskStatus, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidTaskTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}
