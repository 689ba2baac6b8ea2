use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::TenantId;

/// Per-tenant plan. `anchor_at` fixes the day-of-month every billing cycle
/// rolls on; mutation is owned by an external admin surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub tenant_id: TenantId,
    pub plan: String,
    pub anchor_at: DateTime<Utc>,
    pub included_minutes: i64,
}
