//! Inbound telephony endpoints: call routing and completed-call capture.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use frontdesk_core::domain::call::{CallId, CallRecord};
use frontdesk_core::routing::{resolve, RoutingAction};
use frontdesk_db::repositories::{CallRepository, RoutingRuleRepository};

use crate::api::{reject, require_tenant, Rejection};

pub const WEBHOOK_SECRET_HEADER: &str = "x-frontdesk-webhook-secret";

#[derive(Clone)]
pub struct CallsState {
    rules: Arc<dyn RoutingRuleRepository>,
    calls: Arc<dyn CallRepository>,
    webhook_secret: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
pub struct RouteCallRequest {
    pub tenant_id: String,
    /// Wall-clock time at the tenant's location, already resolved to their
    /// timezone (DST included) by the telephony collaborator. Defaults to
    /// UTC now when absent.
    #[serde(default)]
    pub local_datetime: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct RouteCallResponse {
    pub matched: bool,
    pub rule: Option<String>,
    pub action: Option<RoutingAction>,
}

#[derive(Debug, Deserialize)]
pub struct RecordCallRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub call_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecordCallResponse {
    pub call: CallRecord,
}

pub fn router(
    rules: Arc<dyn RoutingRuleRepository>,
    calls: Arc<dyn CallRepository>,
    webhook_secret: Option<SecretString>,
) -> Router {
    Router::new()
        .route("/api/v1/calls/route", post(route_call))
        .route("/api/v1/calls", post(record_call))
        .with_state(CallsState { rules, calls, webhook_secret })
}

/// Resolve the routing rule for a live call. "No rule matched" is a defined
/// 200 outcome: the telephony collaborator owns the default action, so this
/// endpoint never errors on rule problems.
pub async fn route_call(
    State(state): State<CallsState>,
    headers: HeaderMap,
    Json(request): Json<RouteCallRequest>,
) -> Result<Json<RouteCallResponse>, Rejection> {
    verify_webhook_secret(&state, &headers)?;
    let tenant = require_tenant(Some(&request.tenant_id))?;

    let rules = match state.rules.rules_for_tenant(&tenant).await {
        Ok(rules) => rules,
        Err(error) => {
            warn!(
                event_name = "calls.rules.unavailable",
                tenant_id = tenant.as_str(),
                error = %error,
                "routing rules unavailable; treating tenant as unrouted"
            );
            Vec::new()
        }
    };

    let at = request.local_datetime.unwrap_or_else(|| Utc::now().naive_utc());
    let response = match resolve(at, &rules) {
        Some(rule) => {
            info!(
                event_name = "calls.routed",
                tenant_id = tenant.as_str(),
                rule = %rule.name,
                "call matched a routing rule"
            );
            RouteCallResponse {
                matched: true,
                rule: Some(rule.name.clone()),
                action: Some(rule.action.clone()),
            }
        }
        None => RouteCallResponse { matched: false, rule: None, action: None },
    };

    Ok(Json(response))
}

/// Capture a completed call for usage accounting. Unlike event delivery,
/// this row is canonical, so persistence failures are surfaced.
pub async fn record_call(
    State(state): State<CallsState>,
    headers: HeaderMap,
    Json(request): Json<RecordCallRequest>,
) -> Result<(StatusCode, Json<RecordCallResponse>), Rejection> {
    verify_webhook_secret(&state, &headers)?;
    let tenant = require_tenant(Some(&request.tenant_id))?;

    let duration_secs = request
        .duration_secs
        .or_else(|| {
            request.ended_at.map(|ended_at| (ended_at - request.started_at).num_seconds())
        })
        .unwrap_or(0)
        .max(0);

    let call = CallRecord {
        id: CallId(
            request.call_id.filter(|id| !id.trim().is_empty()).unwrap_or_else(call_id),
        ),
        tenant_id: tenant,
        started_at: request.started_at,
        ended_at: request.ended_at,
        duration_secs,
    };

    state
        .calls
        .save(&call)
        .await
        .map_err(|error| reject(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;

    Ok((StatusCode::CREATED, Json(RecordCallResponse { call })))
}

fn verify_webhook_secret(state: &CallsState, headers: &HeaderMap) -> Result<(), Rejection> {
    let Some(expected) = &state.webhook_secret else {
        return Ok(());
    };

    let supplied = headers.get(WEBHOOK_SECRET_HEADER).and_then(|value| value.to_str().ok());
    if supplied == Some(expected.expose_secret()) {
        Ok(())
    } else {
        Err(reject(StatusCode::UNAUTHORIZED, "invalid webhook secret"))
    }
}

fn call_id() -> String {
    Uuid::new_v4().simple().to_string()
}
