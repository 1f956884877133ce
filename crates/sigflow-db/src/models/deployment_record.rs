//! Deployment record model.
//!
//! The local system-of-record for a disclaimer rule: one row per
//! `(tenant_id, rule_name)`. The remote rule id is not the key because it is
//! unknown until the remote surface has created the rule, and never known at
//! all when the rule was handed to an administrator as a script.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Type};
use uuid::Uuid;

/// Where a rule stands from the platform's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "deployment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Rule is live on the remote mail system.
    Deployed,
    /// A create-or-update script was generated and awaits an administrator.
    PendingManualExecution,
    /// A removal script was generated and awaits an administrator.
    PendingDeletion,
    /// Rule was removed from the remote mail system.
    Deleted,
}

impl DeploymentStatus {
    /// Stable string form, matching the database enum labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::PendingManualExecution => "pending_manual_execution",
            DeploymentStatus::PendingDeletion => "pending_deletion",
            DeploymentStatus::Deleted => "deleted",
        }
    }

    /// True while the outcome depends on an administrator running a script.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::PendingManualExecution | DeploymentStatus::PendingDeletion
        )
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Any deploy outcome may overwrite any status (a redeploy restarts the
    /// lifecycle); removal states cannot follow `Deleted`.
    #[must_use]
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        !matches!(
            (self, next),
            (
                DeploymentStatus::Deleted,
                DeploymentStatus::PendingDeletion | DeploymentStatus::Deleted
            )
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked disclaimer rule.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub rule_name: String,
    /// Identifier assigned by the remote surface, absent for script deployments.
    pub remote_rule_id: Option<String>,
    pub status: DeploymentStatus,
    /// SHA-256 of the deployed rule content.
    pub content_hash: String,
    /// Administrative script awaiting manual execution, kept for later download.
    pub script_text: Option<String>,
    /// Incremented on every accepted write.
    pub version: i64,
    pub last_deployed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Desired state of a record after a deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertDeploymentRecord {
    pub tenant_id: Uuid,
    pub rule_name: String,
    pub remote_rule_id: Option<String>,
    pub status: DeploymentStatus,
    pub content_hash: String,
    pub script_text: Option<String>,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Find the record for a rule name within a tenant.
    pub async fn find_by_name<'e, E>(
        executor: E,
        tenant_id: Uuid,
        rule_name: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT id, tenant_id, rule_name, remote_rule_id, status, content_hash,
                   script_text, version, last_deployed_at, created_at
            FROM deployment_records
            WHERE tenant_id = $1 AND rule_name = $2
            ",
        )
        .bind(tenant_id)
        .bind(rule_name)
        .fetch_optional(executor)
        .await
    }

    /// List every record of a tenant, most recently deployed first.
    pub async fn list_by_tenant<'e, E>(
        executor: E,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT id, tenant_id, rule_name, remote_rule_id, status, content_hash,
                   script_text, version, last_deployed_at, created_at
            FROM deployment_records
            WHERE tenant_id = $1
            ORDER BY last_deployed_at DESC, rule_name
            ",
        )
        .bind(tenant_id)
        .fetch_all(executor)
        .await
    }

    /// Insert or update the record keyed by `(tenant_id, rule_name)`.
    ///
    /// Last writer wins, but a write whose `deployed_at` is older than the
    /// stored `last_deployed_at` is discarded and the stored row is returned
    /// unchanged.
    pub async fn upsert(
        pool: &PgPool,
        params: UpsertDeploymentRecord,
    ) -> Result<Self, sqlx::Error> {
        let written: Option<Self> = sqlx::query_as(
            r"
            INSERT INTO deployment_records (
                id, tenant_id, rule_name, remote_rule_id, status,
                content_hash, script_text, version, last_deployed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8)
            ON CONFLICT (tenant_id, rule_name) DO UPDATE SET
                remote_rule_id = EXCLUDED.remote_rule_id,
                status = EXCLUDED.status,
                content_hash = EXCLUDED.content_hash,
                script_text = EXCLUDED.script_text,
                version = deployment_records.version + 1,
                last_deployed_at = EXCLUDED.last_deployed_at
            WHERE deployment_records.last_deployed_at <= EXCLUDED.last_deployed_at
            RETURNING id, tenant_id, rule_name, remote_rule_id, status, content_hash,
                      script_text, version, last_deployed_at, created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(params.tenant_id)
        .bind(&params.rule_name)
        .bind(&params.remote_rule_id)
        .bind(params.status)
        .bind(&params.content_hash)
        .bind(&params.script_text)
        .bind(params.deployed_at)
        .fetch_optional(pool)
        .await?;

        match written {
            Some(record) => Ok(record),
            None => {
                tracing::warn!(
                    tenant_id = %params.tenant_id,
                    rule_name = %params.rule_name,
                    "Discarded stale deployment record write"
                );
                Self::find_by_name(pool, params.tenant_id, &params.rule_name)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::PendingManualExecution).unwrap();
        assert_eq!(json, "\"pending_manual_execution\"");
        assert_eq!(
            DeploymentStatus::PendingDeletion.to_string(),
            "pending_deletion"
        );
    }

    #[test]
    fn test_pending_statuses() {
        assert!(DeploymentStatus::PendingManualExecution.is_pending());
        assert!(DeploymentStatus::PendingDeletion.is_pending());
        assert!(!DeploymentStatus::Deployed.is_pending());
        assert!(!DeploymentStatus::Deleted.is_pending());
    }

    #[test]
    fn test_deleted_rules_cannot_be_deleted_again() {
        assert!(!DeploymentStatus::Deleted.can_transition_to(DeploymentStatus::PendingDeletion));
        assert!(!DeploymentStatus::Deleted.can_transition_to(DeploymentStatus::Deleted));
        assert!(DeploymentStatus::Deleted.can_transition_to(DeploymentStatus::Deployed));
    }

    #[test]
    fn test_update_in_place_is_allowed() {
        assert!(DeploymentStatus::Deployed.can_transition_to(DeploymentStatus::Deployed));
        assert!(DeploymentStatus::PendingManualExecution
            .can_transition_to(DeploymentStatus::Deployed));
        assert!(DeploymentStatus::PendingDeletion.can_transition_to(DeploymentStatus::Deleted));
    }
}
