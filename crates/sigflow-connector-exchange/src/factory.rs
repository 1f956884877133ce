//! Composition of per-tenant connectors.

use std::sync::Arc;
use tracing::debug;

use crate::audit::DeploymentAuditLog;
use crate::auth::TokenManager;
use crate::connector::ExchangeConnector;
use crate::management_client::ManagementClient;
use crate::probe::ConnectionProbe;
use crate::reconciler::RuleReconciler;
use crate::script::FallbackScriptGenerator;
use crate::store::{DeploymentLogStore, DeploymentRecordStore};
use crate::{ExchangeConfig, ExchangeResult, TenantCredential};

/// Long-lived factory holding everything tenants share: configuration, the
/// token manager, the record store and the audit log.
///
/// Each connector it builds is bound to exactly one credential; tokens are
/// cached by tenant inside the shared [`TokenManager`], so connectors never
/// see each other's tokens.
#[derive(Debug, Clone)]
pub struct ConnectorFactory {
    config: Arc<ExchangeConfig>,
    tokens: Arc<TokenManager>,
    records: Arc<dyn DeploymentRecordStore>,
    audit: Arc<DeploymentAuditLog>,
}

impl ConnectorFactory {
    /// Creates a factory over separate record and log stores.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Config` if the HTTP client cannot be built.
    pub fn new(
        config: ExchangeConfig,
        records: Arc<dyn DeploymentRecordStore>,
        logs: Arc<dyn DeploymentLogStore>,
    ) -> ExchangeResult<Self> {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenManager::new(config.clone())?);
        Ok(Self {
            config,
            tokens,
            records,
            audit: Arc::new(DeploymentAuditLog::new(logs)),
        })
    }

    /// Creates a factory over one store implementing both seams.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Config` if the HTTP client cannot be built.
    pub fn with_store<S>(config: ExchangeConfig, store: Arc<S>) -> ExchangeResult<Self>
    where
        S: DeploymentRecordStore + DeploymentLogStore + 'static,
    {
        Self::new(config, store.clone(), store)
    }

    /// Builds a connector bound to one tenant's credential.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Config` if the credential is incomplete.
    pub fn for_tenant(&self, credential: TenantCredential) -> ExchangeResult<ExchangeConnector> {
        credential.validate()?;
        debug!(tenant_id = %credential.tenant_id, "Building tenant connector");

        let tenant_id = credential.tenant_id;
        let client = Arc::new(ManagementClient::new(
            self.config.clone(),
            self.tokens.clone(),
            Arc::new(credential),
        )?);

        let scripts =
            FallbackScriptGenerator::new(tenant_id, self.records.clone(), self.audit.clone());
        let probe = ConnectionProbe::new(client.clone(), self.audit.clone());
        let reconciler = RuleReconciler::new(
            client.clone(),
            scripts.clone(),
            self.records.clone(),
            self.audit.clone(),
        );

        Ok(ExchangeConnector::new(
            client,
            probe,
            reconciler,
            scripts,
            self.records.clone(),
            self.audit.clone(),
        ))
    }

    /// Builds a connector for a tenant whose stored settings just changed.
    ///
    /// Tokens cached under the previous settings are dropped first, so the
    /// next call exchanges the new credential for both scopes.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Config` if the credential is incomplete.
    pub async fn reconfigure_tenant(
        &self,
        credential: TenantCredential,
    ) -> ExchangeResult<ExchangeConnector> {
        credential.validate()?;
        self.tokens.invalidate(credential.tenant_id).await;
        debug!(tenant_id = %credential.tenant_id, "Dropped cached tokens after settings update");
        self.for_tenant(credential)
    }

    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<DeploymentAuditLog> {
        &self.audit
    }
}
