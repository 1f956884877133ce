//! Connection test against the tenant's directory.

use serde::{Deserialize, Serialize};
use sigflow_db::{DeploymentLogStatus, DeploymentOperation};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::audit::{AuditEntry, DeploymentAuditLog};
use crate::auth::TokenScope;
use crate::management_client::ManagementClient;
use crate::{ExchangeError, ExchangeResult};

/// Outcome of a connection test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Performs one authenticated read of organization metadata.
#[derive(Debug, Clone)]
pub struct ConnectionProbe {
    client: Arc<ManagementClient>,
    audit: Arc<DeploymentAuditLog>,
}

impl ConnectionProbe {
    #[must_use]
    pub fn new(client: Arc<ManagementClient>, audit: Arc<DeploymentAuditLog>) -> Self {
        Self { client, audit }
    }

    /// Tests the tenant's credentials. Never mutates remote state and never
    /// returns an error: failures are described in the result.
    #[instrument(skip(self), fields(tenant_id = %self.client.credential().tenant_id))]
    pub async fn test(&self) -> ProbeResult {
        let started = Instant::now();
        let timeout = self.client.config().operation_timeout;

        let outcome = match tokio::time::timeout(timeout, self.read_organization()).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        };

        let directory_tenant_id = self.client.credential().directory_tenant_id.clone();
        let (result, status) = match outcome {
            Ok(org) => {
                let name = org.display_name.unwrap_or_else(|| org.id.clone());
                info!(organization = %name, "Connection test succeeded");
                (
                    ProbeResult {
                        success: true,
                        message: format!("Connected to organization '{name}'"),
                        details: Some(serde_json::json!({
                            "organizationId": org.id,
                            "displayName": name,
                            "directoryTenantId": directory_tenant_id,
                        })),
                    },
                    DeploymentLogStatus::Success,
                )
            }
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                (
                    ProbeResult {
                        success: false,
                        message: format!("{} ({e})", e.remediation()),
                        details: Some(serde_json::json!({
                            "errorCode": e.error_code(),
                            "directoryTenantId": directory_tenant_id,
                        })),
                    },
                    DeploymentLogStatus::Error,
                )
            }
        };

        let mut entry = AuditEntry::new(
            self.client.credential().tenant_id,
            DeploymentOperation::TestConnection,
            status,
            result.message.clone(),
        )
        .timed(started);
        entry.details = result.details.clone();
        self.audit.record(entry).await;

        result
    }

    async fn read_organization(&self) -> ExchangeResult<Organization> {
        let url = self
            .client
            .config()
            .organization_url(&self.client.credential().directory_tenant_id);

        let page: crate::management_client::ODataResponse<Organization> =
            self.client.get(TokenScope::Directory, &url).await?;

        page.value.into_iter().next().ok_or_else(|| {
            ExchangeError::Authorization(
                "organization metadata is not readable with the granted permissions".to_string(),
            )
        })
    }
}
