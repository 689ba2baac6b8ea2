use sqlx::{sqlite::SqliteRow, Row};

use frontdesk_core::domain::event::TenantId;
use frontdesk_core::domain::subscription::Subscription;

use super::task_event::parse_timestamp;
use super::{RepositoryError, SubscriptionRepository};
use crate::DbPool;

pub struct SqlSubscriptionRepository {
    pool: DbPool,
}

impl SqlSubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubscriptionRepository for SqlSubscriptionRepository {
    async fn find_by_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, plan, anchor_at, included_minutes
             FROM subscription
             WHERE tenant_id = ?",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscription_from_row).transpose()
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO subscription (tenant_id, plan, anchor_at, included_minutes)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                plan = excluded.plan,
                anchor_at = excluded.anchor_at,
                included_minutes = excluded.included_minutes",
        )
        .bind(subscription.tenant_id.as_str())
        .bind(&subscription.plan)
        .bind(subscription.anchor_at.to_rfc3339())
        .bind(subscription.included_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn subscription_from_row(row: SqliteRow) -> Result<Subscription, RepositoryError> {
    Ok(Subscription {
        tenant_id: TenantId(row.get("tenant_id")),
        plan: row.get("plan"),
        anchor_at: parse_timestamp("anchor_at", row.get("anchor_at"))?,
        included_minutes: row.get("included_minutes"),
    })
}
