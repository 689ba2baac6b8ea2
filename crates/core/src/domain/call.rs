use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

/// One handled phone call. `ended_at` is absent while the call is live;
/// only completed calls are billable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub tenant_id: TenantId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
}

impl CallRecord {
    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }
}
