use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use frontdesk_core::cursor::Cursor;
use frontdesk_core::domain::call::CallRecord;
use frontdesk_core::domain::event::{TaskEvent, TenantId};
use frontdesk_core::domain::subscription::Subscription;
use frontdesk_core::domain::task::{Task, TaskId};
use frontdesk_core::routing::RoutingRule;

pub mod call;
pub mod memory;
pub mod routing;
pub mod subscription;
pub mod task;
pub mod task_event;

pub use call::SqlCallRepository;
pub use memory::{
    InMemoryCallRepository, InMemoryRoutingRuleRepository, InMemorySubscriptionRepository,
    InMemoryTaskEventRepository, InMemoryTaskRepository,
};
pub use routing::SqlRoutingRuleRepository;
pub use subscription::SqlSubscriptionRepository;
pub use task::SqlTaskRepository;
pub use task_event::SqlTaskEventRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only, tenant-partitioned event log. `fetch_since` returns events
/// in ascending cursor order, strictly after `since`.
#[async_trait]
pub trait TaskEventRepository: Send + Sync {
    async fn append(&self, tenant_id: &TenantId, event: &TaskEvent) -> Result<(), RepositoryError>;

    async fn fetch_since(
        &self,
        tenant_id: &TenantId,
        since: Option<&Cursor>,
        limit: u32,
    ) -> Result<Vec<TaskEvent>, RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &TaskId,
    ) -> Result<Option<Task>, RepositoryError>;

    /// Records whose `updated_at` is strictly after `since`, ascending,
    /// capped at `limit`. This is the reconciliation query the long-poll
    /// engine falls back to.
    async fn list_changed_since(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Task>, RepositoryError>;
}

#[async_trait]
pub trait CallRepository: Send + Sync {
    async fn save(&self, call: &CallRecord) -> Result<(), RepositoryError>;

    async fn list_started_within(
        &self,
        tenant_id: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallRecord>, RepositoryError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, RepositoryError>;

    async fn save(&self, subscription: &Subscription) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoutingRuleRepository: Send + Sync {
    /// The tenant's routing rules. Tenants without a stored rule set get an
    /// empty list.
    async fn rules_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RoutingRule>, RepositoryError>;
}
