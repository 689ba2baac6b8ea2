use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use frontdesk_core::domain::call::{CallId, CallRecord};
use frontdesk_core::domain::event::TenantId;

use super::task_event::parse_timestamp;
use super::{CallRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCallRepository {
    pool: DbPool,
}

impl SqlCallRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CallRepository for SqlCallRepository {
    async fn save(&self, call: &CallRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO call_record (id, tenant_id, started_at, ended_at, duration_secs)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                ended_at = excluded.ended_at,
                duration_secs = excluded.duration_secs",
        )
        .bind(&call.id.0)
        .bind(call.tenant_id.as_str())
        .bind(call.started_at.to_rfc3339())
        .bind(call.ended_at.map(|value| value.to_rfc3339()))
        .bind(call.duration_secs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_started_within(
        &self,
        tenant_id: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, started_at, ended_at, duration_secs
             FROM call_record
             WHERE tenant_id = ? AND started_at >= ? AND started_at < ?
             ORDER BY started_at ASC",
        )
        .bind(tenant_id.as_str())
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(call_from_row).collect()
    }
}

fn call_from_row(row: SqliteRow) -> Result<CallRecord, RepositoryError> {
    let ended_at = row
        .get::<Option<String>, _>("ended_at")
        .map(|value| parse_timestamp("ended_at", value))
        .transpose()?;

    Ok(CallRecord {
        id: CallId(row.get("id")),
        tenant_id: TenantId(row.get("tenant_id")),
        started_at: parse_timestamp("started_at", row.get("started_at"))?,
        ended_at,
        duration_secs: row.get("duration_secs"),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use frontdesk_core::domain::call::{CallId, CallRecord};
    use frontdesk_core::domain::event::TenantId;

    use crate::connect_with_settings;
    use crate::migrations;
    use crate::repositories::{CallRepository, SqlCallRepository};

    async fn repo() -> SqlCallRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlCallRepository::new(pool)
    }

    fn call(tenant: &str, id: &str, started_at: chrono::DateTime<Utc>) -> CallRecord {
        CallRecord {
            id: CallId(id.to_string()),
            tenant_id: TenantId(tenant.to_string()),
            started_at,
            ended_at: Some(started_at + Duration::seconds(90)),
            duration_secs: 90,
        }
    }

    #[tokio::test]
    async fn window_query_is_half_open_and_tenant_scoped() {
        let repo = repo().await;
        let start = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap();

        repo.save(&call("acme-dental", "c-before", start - Duration::hours(1))).await.expect("save");
        repo.save(&call("acme-dental", "c-at-start", start)).await.expect("save");
        repo.save(&call("acme-dental", "c-inside", start + Duration::days(3))).await.expect("save");
        repo.save(&call("acme-dental", "c-at-end", end)).await.expect("save");
        repo.save(&call("rival-clinic", "c-other", start + Duration::days(1))).await.expect("save");

        let tenant = TenantId("acme-dental".to_string());
        let calls = repo.list_started_within(&tenant, start, end).await.expect("list");

        let ids: Vec<&str> = calls.iter().map(|call| call.id.0.as_str()).collect();
        assert_eq!(ids, vec!["c-at-start", "c-inside"]);
    }

    #[tokio::test]
    async fn live_calls_round_trip_without_end_time() {
        let repo = repo().await;
        let started_at = Utc.with_ymd_and_hms(2026, 1, 20, 9, 30, 0).unwrap();

        let mut live = call("acme-dental", "c-live", started_at);
        live.ended_at = None;
        live.duration_secs = 0;
        repo.save(&live).await.expect("save");

        let tenant = TenantId("acme-dental".to_string());
        let calls = repo
            .list_started_within(&tenant, started_at - Duration::hours(1), started_at + Duration::hours(1))
            .await
            .expect("list");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].ended_at.is_none());
        assert!(!calls[0].is_completed());
    }
}
