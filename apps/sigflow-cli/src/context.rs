//! Wiring of stores, factory and the tenant connector for one invocation.

use anyhow::{bail, Context as _};
use sigflow_connector_exchange::{
    ConnectorFactory, ExchangeConnector, InMemoryDeploymentStore, PgDeploymentStore,
};
use sigflow_core::TenantId;
use sigflow_db::TenantConnectorSettings;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GlobalArgs;

const MAX_DB_CONNECTIONS: u32 = 5;

/// Resolved runtime for a command.
pub struct AppContext {
    pub factory: ConnectorFactory,
    pub tenant_id: TenantId,
    pool: Option<PgPool>,
}

impl AppContext {
    /// Connects the configured store and builds the factory.
    pub async fn open(args: &GlobalArgs) -> anyhow::Result<Self> {
        let config = args.exchange_config()?;
        let tenant_id = args.tenant_id()?;

        let (factory, pool) = match &args.database_url {
            Some(url) => {
                let pool = sigflow_db::connect(url, MAX_DB_CONNECTIONS)
                    .await
                    .context("failed to connect to the database")?;
                sigflow_db::run_migrations(&pool).await?;
                let store = Arc::new(PgDeploymentStore::new(pool.clone()));
                (ConnectorFactory::with_store(config, store)?, Some(pool))
            }
            None => {
                warn!("DATABASE_URL not set; records and audit entries are kept in memory only");
                let store = Arc::new(InMemoryDeploymentStore::new());
                (ConnectorFactory::with_store(config, store)?, None)
            }
        };

        debug!(tenant_id = %tenant_id, persistent = pool.is_some(), "Context opened");
        Ok(Self {
            factory,
            tenant_id,
            pool,
        })
    }

    /// Database pool, required by commands that edit stored settings.
    pub fn pool(&self) -> anyhow::Result<&PgPool> {
        match &self.pool {
            Some(pool) => Ok(pool),
            None => bail!("this command needs DATABASE_URL"),
        }
    }

    /// Stored connector settings of the tenant, if persisted.
    pub async fn stored_settings(&self) -> anyhow::Result<Option<TenantConnectorSettings>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };
        TenantConnectorSettings::find_by_tenant(pool, *self.tenant_id.as_uuid())
            .await
            .context("failed to load connector settings")
    }

    /// Builds the connector for the tenant.
    pub async fn connector(&self, args: &GlobalArgs) -> anyhow::Result<ExchangeConnector> {
        let stored = self.stored_settings().await?;
        let credential = args.credential(self.tenant_id, stored.as_ref())?;
        Ok(self.factory.for_tenant(credential)?)
    }
}
