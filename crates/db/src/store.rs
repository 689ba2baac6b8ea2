//! Tenant-partitioned event store with graceful degradation.
//!
//! The primary sink (the durable `task_event` table) is the source of truth
//! while it is healthy. Any primary failure is logged and the operation is
//! retried once against the in-memory ring buffer; backend errors never
//! reach the caller. The two sinks are not kept consistent with each other:
//! the buffer is a lossy last resort, and the long-poll engine's
//! reconciliation query against the task table is the correctness backstop.

use std::sync::Arc;

use tracing::{debug, warn};

use frontdesk_core::cursor::Cursor;
use frontdesk_core::domain::event::{TaskEvent, TaskEventKind, TenantId};

use crate::repositories::{InMemoryTaskEventRepository, TaskEventRepository};

pub struct EventStore {
    primary: Option<Arc<dyn TaskEventRepository>>,
    fallback: InMemoryTaskEventRepository,
}

impl EventStore {
    /// Store backed by a durable sink, with the in-memory buffer on standby.
    pub fn durable(primary: Arc<dyn TaskEventRepository>, fallback_capacity: u32) -> Self {
        Self { primary: Some(primary), fallback: buffer(fallback_capacity) }
    }

    /// Memory-only store for deployments without a durable event backend.
    pub fn in_memory(capacity: u32) -> Self {
        Self { primary: None, fallback: buffer(capacity) }
    }

    pub fn is_durable(&self) -> bool {
        self.primary.is_some()
    }

    /// Append one event. Returns `None` only for malformed input (blank
    /// tenant or subject); a failing backend downgrades to the buffer
    /// silently, because task mutations must not fail on event delivery.
    pub async fn publish(
        &self,
        tenant_id: &TenantId,
        kind: TaskEventKind,
        subject_id: &str,
        payload: serde_json::Value,
    ) -> Option<TaskEvent> {
        if tenant_id.is_blank() || subject_id.trim().is_empty() {
            debug!(
                event_name = "events.publish.malformed",
                tenant_id = tenant_id.as_str(),
                "dropping publish with blank tenant or subject"
            );
            return None;
        }

        let event = TaskEvent::new(kind, subject_id, payload);

        if let Some(primary) = &self.primary {
            match primary.append(tenant_id, &event).await {
                Ok(()) => return Some(event),
                Err(error) => {
                    warn!(
                        event_name = "events.publish.primary_failed",
                        tenant_id = tenant_id.as_str(),
                        error = %error,
                        "durable event append failed; buffering in memory"
                    );
                }
            }
        }

        if let Err(error) = self.fallback.append(tenant_id, &event).await {
            warn!(
                event_name = "events.publish.fallback_failed",
                tenant_id = tenant_id.as_str(),
                error = %error,
                "in-memory event append failed; event dropped"
            );
        }

        Some(event)
    }

    /// Events strictly after `since`, ascending, capped at `limit`. Serves
    /// from the buffer when the primary errors; an empty list is the worst
    /// case a caller ever sees.
    pub async fn fetch(
        &self,
        tenant_id: &TenantId,
        since: Option<&Cursor>,
        limit: u32,
    ) -> Vec<TaskEvent> {
        if tenant_id.is_blank() {
            return Vec::new();
        }

        if let Some(primary) = &self.primary {
            match primary.fetch_since(tenant_id, since, limit).await {
                Ok(events) => return events,
                Err(error) => {
                    warn!(
                        event_name = "events.fetch.primary_failed",
                        tenant_id = tenant_id.as_str(),
                        error = %error,
                        "durable event fetch failed; serving from memory"
                    );
                }
            }
        }

        match self.fallback.fetch_since(tenant_id, since, limit).await {
            Ok(events) => events,
            Err(error) => {
                warn!(
                    event_name = "events.fetch.fallback_failed",
                    tenant_id = tenant_id.as_str(),
                    error = %error,
                    "in-memory event fetch failed"
                );
                Vec::new()
            }
        }
    }
}

fn buffer(capacity: u32) -> InMemoryTaskEventRepository {
    InMemoryTaskEventRepository::new(capacity as usize)
}
