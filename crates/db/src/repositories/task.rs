use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use frontdesk_core::domain::event::TenantId;
use frontdesk_core::domain::task::{Task, TaskId, TaskStatus};

use super::task_event::parse_timestamp;
use super::{RepositoryError, TaskRepository};
use crate::DbPool;

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO task (id, tenant_id, title, detail, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                detail = excluded.detail,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(task.tenant_id.as_str())
        .bind(&task.title)
        .bind(task.detail.as_deref())
        .bind(task.status.as_str())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &TaskId,
    ) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, title, detail, status, created_at, updated_at
             FROM task
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id.as_str())
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_from_row).transpose()
    }

    async fn list_changed_since(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, title, detail, status, created_at, updated_at
             FROM task
             WHERE tenant_id = ? AND updated_at > ?
             ORDER BY updated_at ASC
             LIMIT ?",
        )
        .bind(tenant_id.as_str())
        .bind(since.to_rfc3339())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_from_row).collect()
    }
}

fn task_from_row(row: SqliteRow) -> Result<Task, RepositoryError> {
    let status_raw: String = row.get("status");
    let status = TaskStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_raw}`")))?;

    Ok(Task {
        id: TaskId(row.get("id")),
        tenant_id: TenantId(row.get("tenant_id")),
        title: row.get("title"),
        detail: row.get("detail"),
        status,
        created_at: parse_timestamp("created_at", row.get("created_at"))?,
        updated_at: parse_timestamp("updated_at", row.get("updated_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use frontdesk_core::domain::event::TenantId;
    use frontdesk_core::domain::task::{Task, TaskId, TaskStatus};

    use crate::connect_with_settings;
    use crate::migrations;
    use crate::repositories::{SqlTaskRepository, TaskRepository};

    async fn repo() -> SqlTaskRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlTaskRepository::new(pool)
    }

    fn task(tenant: &str, id: &str, updated_offset_secs: i64) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId(id.to_string()),
            tenant_id: TenantId(tenant.to_string()),
            title: format!("task {id}"),
            detail: Some("left a voicemail".to_string()),
            status: TaskStatus::Open,
            created_at: now,
            updated_at: now + Duration::seconds(updated_offset_secs),
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let repo = repo().await;
        let task = task("acme-dental", "T-1", 0);

        repo.save(&task).await.expect("save");
        let found = repo
            .find_by_id(&task.tenant_id, &task.id)
            .await
            .expect("find")
            .expect("task should exist");

        assert_eq!(found.title, task.title);
        assert_eq!(found.status, TaskStatus::Open);
        assert_eq!(found.detail.as_deref(), Some("left a voicemail"));
    }

    #[tokio::test]
    async fn save_updates_existing_rows() {
        let repo = repo().await;
        let mut task = task("acme-dental", "T-1", 0);
        repo.save(&task).await.expect("save");

        task.transition_to(TaskStatus::Accepted, Utc::now()).expect("open -> accepted");
        repo.save(&task).await.expect("save again");

        let found = repo
            .find_by_id(&task.tenant_id, &task.id)
            .await
            .expect("find")
            .expect("task should exist");
        assert_eq!(found.status, TaskStatus::Accepted);
    }

    #[tokio::test]
    async fn find_is_tenant_scoped() {
        let repo = repo().await;
        let task = task("acme-dental", "T-1", 0);
        repo.save(&task).await.expect("save");

        let other = repo
            .find_by_id(&TenantId("rival-clinic".to_string()), &task.id)
            .await
            .expect("find");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn list_changed_since_is_strict_ascending_and_capped() {
        let repo = repo().await;
        let cutoff = Utc::now();

        repo.save(&task("acme-dental", "T-old", -60)).await.expect("save old");
        for index in 0..3 {
            repo.save(&task("acme-dental", &format!("T-{index}"), 10 + index)).await.expect("save");
        }

        let tenant = TenantId("acme-dental".to_string());
        let changed = repo.list_changed_since(&tenant, cutoff, 100).await.expect("list");
        assert_eq!(changed.len(), 3);
        assert!(changed.windows(2).all(|pair| pair[0].updated_at <= pair[1].updated_at));
        assert!(changed.iter().all(|task| task.updated_at > cutoff));

        let capped = repo.list_changed_since(&tenant, cutoff, 2).await.expect("list capped");
        assert_eq!(capped.len(), 2);
    }
}
