//! Per-tenant directory connector settings.
//!
//! The client secret is write-only from the caller's perspective: an update
//! without a secret keeps the stored one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// Stored connector credentials of one tenant.
#[derive(Clone, FromRow, Serialize, Deserialize)]
pub struct TenantConnectorSettings {
    pub tenant_id: Uuid,
    /// Tenant id at the identity provider (GUID or verified domain).
    pub directory_tenant_id: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub connection_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for TenantConnectorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnectorSettings")
            .field("tenant_id", &self.tenant_id)
            .field("directory_tenant_id", &self.directory_tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("connection_enabled", &self.connection_enabled)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Explicit settings update.
#[derive(Clone, Deserialize)]
pub struct UpsertConnectorSettings {
    pub directory_tenant_id: String,
    pub client_id: String,
    /// `None` keeps the stored secret.
    pub client_secret: Option<String>,
    pub connection_enabled: bool,
}

impl std::fmt::Debug for UpsertConnectorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertConnectorSettings")
            .field("directory_tenant_id", &self.directory_tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("connection_enabled", &self.connection_enabled)
            .finish()
    }
}

impl TenantConnectorSettings {
    /// Load the settings of a tenant.
    pub async fn find_by_tenant<'e, E>(
        executor: E,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT tenant_id, directory_tenant_id, client_id, client_secret,
                   connection_enabled, updated_at
            FROM tenant_connector_settings
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id)
        .fetch_optional(executor)
        .await
    }

    /// Create or update the settings of a tenant.
    pub async fn upsert<'e, E>(
        executor: E,
        tenant_id: Uuid,
        data: UpsertConnectorSettings,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO tenant_connector_settings (
                tenant_id, directory_tenant_id, client_id, client_secret, connection_enabled
            )
            VALUES ($1, $2, $3, COALESCE($4, ''), $5)
            ON CONFLICT (tenant_id) DO UPDATE SET
                directory_tenant_id = EXCLUDED.directory_tenant_id,
                client_id = EXCLUDED.client_id,
                client_secret = COALESCE($4, tenant_connector_settings.client_secret),
                connection_enabled = EXCLUDED.connection_enabled,
                updated_at = NOW()
            RETURNING tenant_id, directory_tenant_id, client_id, client_secret,
                      connection_enabled, updated_at
            ",
        )
        .bind(tenant_id)
        .bind(&data.directory_tenant_id)
        .bind(&data.client_id)
        .bind(&data.client_secret)
        .bind(data.connection_enabled)
        .fetch_one(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let settings = TenantConnectorSettings {
            tenant_id: Uuid::new_v4(),
            directory_tenant_id: "contoso.onmicrosoft.com".to_string(),
            client_id: "client".to_string(),
            client_secret: "super-secret-value".to_string(),
            connection_enabled: true,
            updated_at: Utc::now(),
        };

        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let settings = TenantConnectorSettings {
            tenant_id: Uuid::new_v4(),
            directory_tenant_id: "t1".to_string(),
            client_id: "c1".to_string(),
            client_secret: "hidden".to_string(),
            connection_enabled: false,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&settings).unwrap();
        assert!(json.get("client_secret").is_none());
        assert_eq!(json["client_id"], "c1");
    }
}
