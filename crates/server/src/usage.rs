//! Usage reporting for the current billing cycle.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use frontdesk_core::billing::{cycle_window, usage_summary, UsageSummary};
use frontdesk_db::repositories::{CallRepository, SubscriptionRepository};

use crate::api::{reject, require_tenant, Rejection};

#[derive(Clone)]
pub struct UsageState {
    subscriptions: Arc<dyn SubscriptionRepository>,
    calls: Arc<dyn CallRepository>,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub tenant_id: Option<String>,
}

pub fn router(
    subscriptions: Arc<dyn SubscriptionRepository>,
    calls: Arc<dyn CallRepository>,
) -> Router {
    Router::new()
        .route("/api/v1/usage", get(usage))
        .with_state(UsageState { subscriptions, calls })
}

pub async fn usage(
    Query(query): Query<UsageQuery>,
    State(state): State<UsageState>,
) -> Result<Json<UsageSummary>, Rejection> {
    let tenant = require_tenant(query.tenant_id.as_deref())?;

    let subscription = state
        .subscriptions
        .find_by_tenant(&tenant)
        .await
        .map_err(|error| reject(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, "no subscription for tenant"))?;

    let now = Utc::now();
    let (cycle_start, cycle_end) = cycle_window(subscription.anchor_at, now);
    let calls = state
        .calls
        .list_started_within(&tenant, cycle_start, cycle_end)
        .await
        .map_err(|error| reject(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;

    Ok(Json(usage_summary(&subscription, &calls, now)))
}
