use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use frontdesk_core::cursor::Cursor;
use frontdesk_core::domain::event::{TaskEvent, TaskEventKind, TenantId};

use super::{RepositoryError, TaskEventRepository};
use crate::DbPool;

pub struct SqlTaskEventRepository {
    pool: DbPool,
}

impl SqlTaskEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TaskEventRepository for SqlTaskEventRepository {
    async fn append(&self, tenant_id: &TenantId, event: &TaskEvent) -> Result<(), RepositoryError> {
        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|error| RepositoryError::Decode(format!("unencodable payload: {error}")))?;

        sqlx::query(
            "INSERT INTO task_event (tenant_id, cursor, kind, subject_id, payload_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant_id.as_str())
        .bind(event.cursor.as_str())
        .bind(event.kind.as_str())
        .bind(&event.subject_id)
        .bind(payload_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_since(
        &self,
        tenant_id: &TenantId,
        since: Option<&Cursor>,
        limit: u32,
    ) -> Result<Vec<TaskEvent>, RepositoryError> {
        let rows = if let Some(since) = since {
            sqlx::query(
                "SELECT cursor, kind, subject_id, payload_json, occurred_at
                 FROM task_event
                 WHERE tenant_id = ? AND cursor > ?
                 ORDER BY cursor ASC
                 LIMIT ?",
            )
            .bind(tenant_id.as_str())
            .bind(since.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT cursor, kind, subject_id, payload_json, occurred_at
                 FROM task_event
                 WHERE tenant_id = ?
                 ORDER BY cursor ASC
                 LIMIT ?",
            )
            .bind(tenant_id.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: SqliteRow) -> Result<TaskEvent, RepositoryError> {
    let cursor_raw: String = row.get("cursor");
    let kind_raw: String = row.get("kind");
    let kind = TaskEventKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event kind `{kind_raw}`")))?;

    let payload_raw: String = row.get("payload_json");
    let payload = serde_json::from_str(&payload_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid payload_json: {error}")))?;

    let occurred_at = parse_timestamp("occurred_at", row.get("occurred_at"))?;
    let cursor = Cursor::from_raw(cursor_raw);

    Ok(TaskEvent {
        id: cursor.as_str().to_string(),
        cursor,
        kind,
        subject_id: row.get("subject_id"),
        payload,
        occurred_at,
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use frontdesk_core::domain::event::{TaskEvent, TaskEventKind, TenantId};

    use crate::migrations;
    use crate::repositories::{SqlTaskEventRepository, TaskEventRepository};
    use crate::connect_with_settings;

    async fn repo() -> SqlTaskEventRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlTaskEventRepository::new(pool)
    }

    fn tenant(id: &str) -> TenantId {
        TenantId(id.to_string())
    }

    #[tokio::test]
    async fn appended_events_come_back_in_cursor_order() {
        let repo = repo().await;
        let tenant = tenant("acme-dental");

        for index in 0..3 {
            let event = TaskEvent::new(
                TaskEventKind::Created,
                format!("task-{index}"),
                json!({"index": index}),
            );
            repo.append(&tenant, &event).await.expect("append");
        }

        let events = repo.fetch_since(&tenant, None, 100).await.expect("fetch");
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|pair| pair[0].cursor < pair[1].cursor));
    }

    #[tokio::test]
    async fn fetch_is_strictly_after_the_cursor() {
        let repo = repo().await;
        let tenant = tenant("acme-dental");

        let first = TaskEvent::new(TaskEventKind::Created, "task-1", json!({}));
        repo.append(&tenant, &first).await.expect("append first");
        let second = TaskEvent::new(TaskEventKind::Updated, "task-1", json!({}));
        repo.append(&tenant, &second).await.expect("append second");

        let events = repo.fetch_since(&tenant, Some(&first.cursor), 100).await.expect("fetch");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cursor, second.cursor);

        let none = repo.fetch_since(&tenant, Some(&second.cursor), 100).await.expect("fetch");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn tenants_never_see_each_others_events() {
        let repo = repo().await;
        let one = tenant("tenant-one");
        let two = tenant("tenant-two");

        let event = TaskEvent::new(TaskEventKind::Created, "task-1", json!({"private": true}));
        repo.append(&one, &event).await.expect("append");

        assert!(repo.fetch_since(&two, None, 100).await.expect("fetch").is_empty());
        assert_eq!(repo.fetch_since(&one, None, 100).await.expect("fetch").len(), 1);
    }

    #[tokio::test]
    async fn payload_json_round_trips() {
        let repo = repo().await;
        let tenant = tenant("acme-dental");
        let payload = json!({"title": "call back", "vendor_extras": {"lead_score": 82}});

        let event = TaskEvent::new(TaskEventKind::StatusChanged, "task-9", payload.clone());
        repo.append(&tenant, &event).await.expect("append");

        let events = repo.fetch_since(&tenant, None, 10).await.expect("fetch");
        assert_eq!(events[0].payload, payload);
        assert_eq!(events[0].kind, TaskEventKind::StatusChanged);
        assert_eq!(events[0].id, event.cursor.as_str());
    }

    #[tokio::test]
    async fn fetch_honors_the_limit() {
        let repo = repo().await;
        let tenant = tenant("acme-dental");

        for index in 0..5 {
            let event = TaskEvent::new(TaskEventKind::Created, format!("task-{index}"), json!({}));
            repo.append(&tenant, &event).await.expect("append");
        }

        let events = repo.fetch_since(&tenant, None, 2).await.expect("fetch");
        assert_eq!(events.len(), 2);
    }
}
