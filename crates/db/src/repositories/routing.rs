use sqlx::Row;
use tracing::warn;

use frontdesk_core::domain::event::TenantId;
use frontdesk_core::routing::RoutingRule;

use super::{RepositoryError, RoutingRuleRepository};
use crate::DbPool;

/// Reads the admin-owned rule sets. Rule JSON is treated as untrusted:
/// rules that fail to deserialize are skipped with a warning so one bad
/// entry cannot take call handling down.
pub struct SqlRoutingRuleRepository {
    pool: DbPool,
}

impl SqlRoutingRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RoutingRuleRepository for SqlRoutingRuleRepository {
    async fn rules_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RoutingRule>, RepositoryError> {
        let row = sqlx::query("SELECT rules_json FROM routing_rule_set WHERE tenant_id = ?")
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(Vec::new());
        };

        let rules_raw: String = row.get("rules_json");
        Ok(parse_rule_set(tenant_id, &rules_raw))
    }
}

pub(crate) fn parse_rule_set(tenant_id: &TenantId, raw: &str) -> Vec<RoutingRule> {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(
                event_name = "routing.rule_set.unparseable",
                tenant_id = tenant_id.as_str(),
                error = %error,
                "routing rule set is not a JSON array; treating tenant as unrouted"
            );
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RoutingRule>(entry) {
            Ok(rule) => Some(rule),
            Err(error) => {
                warn!(
                    event_name = "routing.rule.skipped",
                    tenant_id = tenant_id.as_str(),
                    error = %error,
                    "skipping undeserializable routing rule"
                );
                None
            }
        })
        .collect()
}
