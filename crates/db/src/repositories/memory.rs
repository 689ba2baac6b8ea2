use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use frontdesk_core::cursor::Cursor;
use frontdesk_core::domain::call::CallRecord;
use frontdesk_core::domain::event::{TaskEvent, TenantId};
use frontdesk_core::domain::subscription::Subscription;
use frontdesk_core::domain::task::{Task, TaskId};
use frontdesk_core::routing::RoutingRule;

use super::{
    CallRepository, RepositoryError, RoutingRuleRepository, SubscriptionRepository,
    TaskEventRepository, TaskRepository,
};

/// Last-resort event buffer: per-tenant ring buffers with a fixed cap,
/// oldest entries dropped first. Lossy across restarts by design.
pub struct InMemoryTaskEventRepository {
    capacity: usize,
    events: RwLock<HashMap<String, VecDeque<TaskEvent>>>,
}

impl InMemoryTaskEventRepository {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), events: RwLock::new(HashMap::new()) }
    }
}

#[async_trait::async_trait]
impl TaskEventRepository for InMemoryTaskEventRepository {
    async fn append(&self, tenant_id: &TenantId, event: &TaskEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        let buffer = events.entry(tenant_id.0.clone()).or_default();
        buffer.push_back(event.clone());
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
        Ok(())
    }

    async fn fetch_since(
        &self,
        tenant_id: &TenantId,
        since: Option<&Cursor>,
        limit: u32,
    ) -> Result<Vec<TaskEvent>, RepositoryError> {
        let events = self.events.read().await;
        let Some(buffer) = events.get(tenant_id.as_str()) else {
            return Ok(Vec::new());
        };

        Ok(buffer
            .iter()
            .filter(|event| since.map_or(true, |since| event.cursor > *since))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, HashMap<String, Task>>>,
}

#[async_trait::async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        tasks
            .entry(task.tenant_id.0.clone())
            .or_default()
            .insert(task.id.0.clone(), task.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &TaskId,
    ) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(tenant_id.as_str()).and_then(|tenant| tenant.get(&id.0)).cloned())
    }

    async fn list_changed_since(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut changed: Vec<Task> = tasks
            .get(tenant_id.as_str())
            .map(|tenant| tenant.values().filter(|task| task.updated_at > since).cloned().collect())
            .unwrap_or_default();

        changed.sort_by_key(|task| task.updated_at);
        changed.truncate(limit as usize);
        Ok(changed)
    }
}

#[derive(Default)]
pub struct InMemoryCallRepository {
    calls: RwLock<HashMap<String, HashMap<String, CallRecord>>>,
}

#[async_trait::async_trait]
impl CallRepository for InMemoryCallRepository {
    async fn save(&self, call: &CallRecord) -> Result<(), RepositoryError> {
        let mut calls = self.calls.write().await;
        calls.entry(call.tenant_id.0.clone()).or_default().insert(call.id.0.clone(), call.clone());
        Ok(())
    }

    async fn list_started_within(
        &self,
        tenant_id: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallRecord>, RepositoryError> {
        let calls = self.calls.read().await;
        let mut within: Vec<CallRecord> = calls
            .get(tenant_id.as_str())
            .map(|tenant| {
                tenant
                    .values()
                    .filter(|call| call.started_at >= start && call.started_at < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        within.sort_by_key(|call| call.started_at);
        Ok(within)
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

#[async_trait::async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn find_by_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(tenant_id.as_str()).cloned())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), RepositoryError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.tenant_id.0.clone(), subscription.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRoutingRuleRepository {
    rules: RwLock<HashMap<String, Vec<RoutingRule>>>,
}

impl InMemoryRoutingRuleRepository {
    pub async fn set_rules(&self, tenant_id: &TenantId, rules: Vec<RoutingRule>) {
        let mut stored = self.rules.write().await;
        stored.insert(tenant_id.0.clone(), rules);
    }
}

#[async_trait::async_trait]
impl RoutingRuleRepository for InMemoryRoutingRuleRepository {
    async fn rules_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RoutingRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(tenant_id.as_str()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use frontdesk_core::domain::event::{TaskEvent, TaskEventKind, TenantId};
    use frontdesk_core::domain::task::{Task, TaskId, TaskStatus};

    use crate::repositories::{
        InMemoryTaskEventRepository, InMemoryTaskRepository, TaskEventRepository, TaskRepository,
    };

    fn tenant(id: &str) -> TenantId {
        TenantId(id.to_string())
    }

    #[tokio::test]
    async fn ring_buffer_drops_oldest_beyond_capacity() {
        let repo = InMemoryTaskEventRepository::new(3);
        let tenant = tenant("acme-dental");

        for index in 0..5 {
            let event = TaskEvent::new(TaskEventKind::Created, format!("task-{index}"), json!({}));
            repo.append(&tenant, &event).await.expect("append");
        }

        let events = repo.fetch_since(&tenant, None, 100).await.expect("fetch");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].subject_id, "task-2");
        assert_eq!(events[2].subject_id, "task-4");
    }

    #[tokio::test]
    async fn fetch_is_tenant_scoped_and_strictly_after_cursor() {
        let repo = InMemoryTaskEventRepository::new(100);
        let one = tenant("tenant-one");
        let two = tenant("tenant-two");

        let first = TaskEvent::new(TaskEventKind::Created, "task-1", json!({}));
        repo.append(&one, &first).await.expect("append");
        let second = TaskEvent::new(TaskEventKind::Updated, "task-1", json!({}));
        repo.append(&one, &second).await.expect("append");

        assert!(repo.fetch_since(&two, None, 100).await.expect("fetch").is_empty());

        let after_first =
            repo.fetch_since(&one, Some(&first.cursor), 100).await.expect("fetch");
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].cursor, second.cursor);
    }

    #[tokio::test]
    async fn task_repo_lists_changes_in_updated_order() {
        let repo = InMemoryTaskRepository::default();
        let now = Utc::now();

        for index in 0..3 {
            let task = Task {
                id: TaskId(format!("T-{index}")),
                tenant_id: tenant("acme-dental"),
                title: format!("task {index}"),
                detail: None,
                status: TaskStatus::Open,
                created_at: now,
                updated_at: now + Duration::seconds(index),
            };
            repo.save(&task).await.expect("save");
        }

        let changed = repo
            .list_changed_since(&tenant("acme-dental"), now - Duration::seconds(1), 10)
            .await
            .expect("list");
        assert_eq!(changed.len(), 3);
        assert_eq!(changed[0].id.0, "T-0");
        assert_eq!(changed[2].id.0, "T-2");
    }
}
