//! Connection settings shared by every command.
//!
//! Each flag falls back to its `SIGFLOW_*` environment variable (a `.env`
//! file is loaded first), so flags override the environment.

use anyhow::{bail, Context};
use clap::Args;
use secrecy::SecretString;
use sigflow_connector_exchange::{
    ExchangeCloudEnvironment, ExchangeConfig, RuleMutationMode, TenantCredential,
    TenantCredentialUpdate,
};
use sigflow_core::TenantId;
use sigflow_db::TenantConnectorSettings;
use std::time::Duration;
use uuid::Uuid;

/// Global connection options.
#[derive(Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Tenant whose rules are managed
    #[arg(long, global = true, env = "SIGFLOW_TENANT_ID")]
    pub tenant: Option<Uuid>,

    /// Cloud environment: commercial, us_government or china
    #[arg(long, global = true, env = "SIGFLOW_CLOUD", default_value = "commercial")]
    pub cloud: String,

    /// Identity provider authority override
    #[arg(long, global = true, env = "SIGFLOW_LOGIN_ENDPOINT")]
    pub login_endpoint: Option<String>,

    /// Directory API base URL override
    #[arg(long, global = true, env = "SIGFLOW_DIRECTORY_BASE_URL")]
    pub directory_base_url: Option<String>,

    /// Management API base URL override (`{tenant_id}` is substituted)
    #[arg(long, global = true, env = "SIGFLOW_MANAGEMENT_BASE_URL")]
    pub management_base_url: Option<String>,

    /// detect (try the live surface first) or script_only
    #[arg(long, global = true, env = "SIGFLOW_MUTATION_MODE", default_value = "detect")]
    pub mutation_mode: String,

    /// Per-request and per-operation timeout in seconds
    #[arg(long, global = true, env = "SIGFLOW_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Postgres URL; without it records and logs live only for this invocation
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Directory tenant id (GUID or verified domain)
    #[arg(long, global = true, env = "SIGFLOW_DIRECTORY_TENANT_ID")]
    pub directory_tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long, global = true, env = "SIGFLOW_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Application client secret
    #[arg(long, global = true, env = "SIGFLOW_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

impl GlobalArgs {
    /// Builds the connector configuration from the resolved options.
    pub fn exchange_config(&self) -> anyhow::Result<ExchangeConfig> {
        let cloud: ExchangeCloudEnvironment = self.cloud.parse()?;
        let mode: RuleMutationMode = self.mutation_mode.parse()?;
        let timeout = Duration::from_secs(self.timeout_secs);

        let mut builder = ExchangeConfig::builder()
            .cloud(cloud)
            .mutation_mode(mode)
            .request_timeout(timeout)
            .operation_timeout(timeout);
        if let Some(url) = &self.login_endpoint {
            builder = builder.login_endpoint(url.clone());
        }
        if let Some(url) = &self.directory_base_url {
            builder = builder.directory_base_url(url.clone());
        }
        if let Some(url) = &self.management_base_url {
            builder = builder.management_base_url(url.clone());
        }

        builder.build().context("invalid connector configuration")
    }

    /// Tenant id, or a throwaway one when nothing is persisted.
    pub fn tenant_id(&self) -> anyhow::Result<TenantId> {
        match (self.tenant, &self.database_url) {
            (Some(id), _) => Ok(TenantId::from_uuid(id)),
            (None, None) => Ok(TenantId::new()),
            (None, Some(_)) => bail!("--tenant (SIGFLOW_TENANT_ID) is required with DATABASE_URL"),
        }
    }

    /// Credential overrides given on the command line or in the environment.
    pub fn credential_update(&self) -> TenantCredentialUpdate {
        TenantCredentialUpdate {
            directory_tenant_id: self.directory_tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone().map(SecretString::from),
            connection_enabled: None,
        }
    }

    /// Resolves the tenant credential: stored settings (if any) with explicit
    /// options layered on top.
    pub fn credential(
        &self,
        tenant_id: TenantId,
        stored: Option<&TenantConnectorSettings>,
    ) -> anyhow::Result<TenantCredential> {
        let base = match stored {
            Some(settings) => TenantCredential::from_settings(settings),
            None => TenantCredential {
                tenant_id,
                directory_tenant_id: String::new(),
                client_id: String::new(),
                client_secret: SecretString::from(String::new()),
                connection_enabled: true,
            },
        };

        let credential = base.apply(self.credential_update());
        credential.validate().context(
            "set SIGFLOW_DIRECTORY_TENANT_ID, SIGFLOW_CLIENT_ID and SIGFLOW_CLIENT_SECRET, \
             or run `sigflow configure`",
        )?;
        Ok(credential)
    }
}
