//! Per-tenant connector facade.

use sigflow_core::{TenantAware, TenantId};
use sigflow_db::{DeploymentLogEntry, DeploymentRecord};
use std::sync::Arc;

use crate::audit::DeploymentAuditLog;
use crate::management_client::ManagementClient;
use crate::probe::{ConnectionProbe, ProbeResult};
use crate::reconciler::{DeploymentResult, RuleReconciler};
use crate::rule::RuleSpec;
use crate::script::{FallbackScriptGenerator, GeneratedScript, ScriptOperation};
use crate::store::DeploymentRecordStore;
use crate::{ExchangeResult, TenantCredential};

/// Connector bound to one tenant. Built by [`crate::ConnectorFactory`].
#[derive(Debug)]
pub struct ExchangeConnector {
    client: Arc<ManagementClient>,
    probe: ConnectionProbe,
    reconciler: RuleReconciler,
    scripts: FallbackScriptGenerator,
    records: Arc<dyn DeploymentRecordStore>,
    audit: Arc<DeploymentAuditLog>,
}

impl ExchangeConnector {
    pub(crate) fn new(
        client: Arc<ManagementClient>,
        probe: ConnectionProbe,
        reconciler: RuleReconciler,
        scripts: FallbackScriptGenerator,
        records: Arc<dyn DeploymentRecordStore>,
        audit: Arc<DeploymentAuditLog>,
    ) -> Self {
        Self {
            client,
            probe,
            reconciler,
            scripts,
            records,
            audit,
        }
    }

    #[must_use]
    pub fn credential(&self) -> &TenantCredential {
        self.client.credential()
    }

    /// Validates credentials with one read of organization metadata.
    pub async fn test_connection(&self) -> ProbeResult {
        self.probe.test().await
    }

    /// Creates or updates a rule, falling back to a script when needed.
    pub async fn deploy(&self, spec: &RuleSpec) -> DeploymentResult {
        self.reconciler.deploy(spec).await
    }

    /// Removes a rule, falling back to a removal script when needed.
    pub async fn remove(&self, rule_name: &str) -> DeploymentResult {
        self.reconciler.remove(rule_name).await
    }

    /// Generates and stores a script without contacting the remote surface.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid spec or `Storage` on write failure.
    pub async fn generate_script(
        &self,
        spec: &RuleSpec,
        operation: ScriptOperation,
    ) -> ExchangeResult<GeneratedScript> {
        self.scripts.generate(spec, operation).await
    }

    /// Stored record of one rule, including any pending script.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be read.
    pub async fn deployment(&self, rule_name: &str) -> ExchangeResult<Option<DeploymentRecord>> {
        self.records.find(self.tenant_id(), rule_name).await
    }

    /// Every stored record of this tenant.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be read.
    pub async fn deployments(&self) -> ExchangeResult<Vec<DeploymentRecord>> {
        self.records.list(self.tenant_id()).await
    }

    /// Most recent audit entries of this tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be read.
    pub async fn recent_logs(&self, limit: usize) -> ExchangeResult<Vec<DeploymentLogEntry>> {
        self.audit.list(self.tenant_id(), limit).await
    }
}

impl TenantAware for ExchangeConnector {
    fn tenant_id(&self) -> TenantId {
        self.client.credential().tenant_id
    }
}
