//! Long-poll engine over the event store.
//!
//! A poll does an immediate fetch, then retries on a fixed interval until
//! the deadline. The deadline is capped at [`MAX_POLL_WAIT_SECS`] no matter
//! what the caller asked for, which bounds how long a connection can hold a
//! worker. A poll that comes up empty falls back to reconciliation: the
//! canonical task table is queried for rows modified after the cursor's
//! instant and `updated` events are synthesized on the fly. The event log is
//! best-effort (see the store's fallback behavior), so reconciliation is the
//! correctness backstop; it is at-least-once and consumers de-duplicate by
//! subject id.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use frontdesk_core::config::EventsConfig;
use frontdesk_core::cursor::Cursor;
use frontdesk_core::domain::event::{TaskEvent, TaskEventKind, TenantId};
use frontdesk_core::domain::task::Task;
use frontdesk_db::repositories::TaskRepository;
use frontdesk_db::EventStore;

/// Hard cap on a single long-poll, regardless of the requested timeout.
pub const MAX_POLL_WAIT_SECS: u64 = 25;

#[derive(Clone, Debug)]
pub struct PollSettings {
    pub interval: Duration,
    pub fetch_limit: u32,
    pub reconcile_limit: u32,
}

impl PollSettings {
    pub fn from_config(events: &EventsConfig) -> Self {
        Self {
            interval: Duration::from_secs(events.poll_interval_secs),
            fetch_limit: events.fetch_limit,
            reconcile_limit: events.reconcile_limit,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PollOutcome {
    pub events: Vec<TaskEvent>,
    pub cursor: Cursor,
}

pub struct PollEngine {
    store: Arc<EventStore>,
    tasks: Arc<dyn TaskRepository>,
    settings: PollSettings,
}

impl PollEngine {
    pub fn new(store: Arc<EventStore>, tasks: Arc<dyn TaskRepository>, settings: PollSettings) -> Self {
        Self { store, tasks, settings }
    }

    /// Poll for events after `cursor`. A missing cursor defaults to "now",
    /// so a first connect only ever sees future events. The returned cursor
    /// is the last event's cursor, or the input unchanged when nothing was
    /// found, making an empty poll an idempotent no-op.
    pub async fn poll(
        &self,
        tenant_id: &TenantId,
        cursor: Option<Cursor>,
        timeout_secs: u64,
    ) -> PollOutcome {
        let cursor = cursor.unwrap_or_else(Cursor::now);
        let deadline = Instant::now() + Duration::from_secs(timeout_secs.min(MAX_POLL_WAIT_SECS));

        loop {
            let events = self.store.fetch(tenant_id, Some(&cursor), self.settings.fetch_limit).await;
            if let Some(last) = events.last() {
                let cursor = last.cursor.clone();
                return PollOutcome { events, cursor };
            }

            if Instant::now() + self.settings.interval > deadline {
                break;
            }
            sleep(self.settings.interval).await;
        }

        self.reconcile(tenant_id, cursor).await
    }

    async fn reconcile(&self, tenant_id: &TenantId, cursor: Cursor) -> PollOutcome {
        let Some(since) = cursor.timestamp() else {
            debug!(
                event_name = "events.reconcile.skipped",
                tenant_id = tenant_id.as_str(),
                cursor = cursor.as_str(),
                "cursor carries no instant; skipping reconciliation"
            );
            return PollOutcome { events: Vec::new(), cursor };
        };

        match self.tasks.list_changed_since(tenant_id, since, self.settings.reconcile_limit).await {
            Ok(tasks) => {
                let events: Vec<TaskEvent> = tasks.iter().map(synthesized_event).collect();
                match events.last() {
                    Some(last) => {
                        let cursor = last.cursor.clone();
                        debug!(
                            event_name = "events.reconcile.served",
                            tenant_id = tenant_id.as_str(),
                            count = events.len(),
                            "serving events synthesized from task timestamps"
                        );
                        PollOutcome { events, cursor }
                    }
                    None => PollOutcome { events, cursor },
                }
            }
            Err(error) => {
                warn!(
                    event_name = "events.reconcile.failed",
                    tenant_id = tenant_id.as_str(),
                    error = %error,
                    "reconciliation query failed; returning an empty poll"
                );
                PollOutcome { events: Vec::new(), cursor }
            }
        }
    }
}

/// Snapshot event for a task row picked up by reconciliation. Ids derive
/// from the row's `updated_at`, so repeated passes over the same row yield
/// fresh ids; consumers de-duplicate by subject id.
fn synthesized_event(task: &Task) -> TaskEvent {
    let payload = serde_json::to_value(task).unwrap_or(serde_json::Value::Null);
    TaskEvent::at(task.updated_at, TaskEventKind::Updated, task.id.0.clone(), payload)
}
