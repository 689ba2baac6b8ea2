//! Shared request plumbing for the JSON API handlers.

use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

use frontdesk_core::domain::event::TenantId;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type Rejection = (StatusCode, Json<ApiError>);

pub fn reject(status: StatusCode, message: impl Into<String>) -> Rejection {
    (status, Json(ApiError { error: message.into() }))
}

/// Tenant scoping is mandatory on every endpoint; a missing or blank tenant
/// id is the one malformed input that gets a 400 instead of a soft no-op.
pub fn require_tenant(raw: Option<&str>) -> Result<TenantId, Rejection> {
    match raw {
        Some(value) if !value.trim().is_empty() => Ok(TenantId(value.trim().to_string())),
        _ => Err(reject(StatusCode::BAD_REQUEST, "tenant_id is required")),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::require_tenant;

    #[test]
    fn blank_and_missing_tenants_are_rejected() {
        assert!(require_tenant(None).is_err());
        let (status, _) = require_tenant(Some("   ")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn tenant_ids_are_trimmed() {
        let tenant = require_tenant(Some("  acme-dental ")).expect("tenant should parse");
        assert_eq!(tenant.as_str(), "acme-dental");
    }
}
