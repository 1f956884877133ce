//! Disclaimer rule deployment connector for Exchange-style mail systems.
//!
//! This crate deploys email-signature disclaimer rules into each tenant's mail
//! system and tracks the outcome.
//!
//! # Features
//!
//! - `OAuth2` client credentials authentication with a per-tenant, per-scope
//!   token cache
//! - Connection testing against directory metadata
//! - Create-or-update reconciliation of transport rules by name
//! - Script fallback when the remote surface refuses programmatic mutation
//! - Deployment records and an append-only audit log (Postgres or in-memory)
//! - Multi-cloud support (Commercial, US Government, China)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sigflow_core::TenantId;
//! use sigflow_connector_exchange::{
//!     ConnectorFactory, ExchangeConfig, InMemoryDeploymentStore, RuleSpec, TenantCredential,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ConnectorFactory::with_store(
//!     ExchangeConfig::builder().build()?,
//!     Arc::new(InMemoryDeploymentStore::new()),
//! )?;
//!
//! let connector = factory.for_tenant(TenantCredential {
//!     tenant_id: TenantId::new(),
//!     directory_tenant_id: "contoso.onmicrosoft.com".to_string(),
//!     client_id: "your-client-id".to_string(),
//!     client_secret: "your-client-secret".to_string().into(),
//!     connection_enabled: true,
//! })?;
//!
//! let result = connector
//!     .deploy(&RuleSpec::new("Company signature", "<p>Contoso Ltd.</p>"))
//!     .await;
//! println!("{}", result.message);
//! # Ok(())
//! # }
//! ```

mod audit;
mod auth;
mod config;
mod connector;
mod error;
mod factory;
mod management_client;
mod probe;
mod reconciler;
mod rule;
mod script;
mod store;

// Re-exports
pub use audit::{AuditEntry, DeploymentAuditLog};
pub use auth::{AccessToken, TokenManager, TokenScope};
pub use config::{
    ExchangeCloudEnvironment, ExchangeConfig, ExchangeConfigBuilder, RuleMutationMode,
    TenantCredential, TenantCredentialUpdate, TENANT_PLACEHOLDER,
};
pub use connector::ExchangeConnector;
pub use error::{ExchangeError, ExchangeResult};
pub use factory::ConnectorFactory;
pub use management_client::{ManagementClient, ODataError, ODataErrorBody, ODataResponse};
pub use probe::{ConnectionProbe, ProbeResult};
pub use reconciler::{DeploymentPhase, DeploymentResult, RuleReconciler};
pub use rule::{
    DisclaimerLocation, FallbackAction, MessageScope, RemoteTransportRule, RuleSpec, RuleState,
    TransportRuleBody, validate_rule_name, MAX_DISCLAIMER_LEN, MAX_RULE_NAME_LEN,
};
pub use script::{
    extract_disclaimer, quote_literal, render, render_removal, render_upsert,
    FallbackScriptGenerator, GeneratedScript, ScriptOperation,
};
pub use store::{
    DeploymentLogStore, DeploymentRecordStore, InMemoryDeploymentStore, PgDeploymentStore,
};

pub use sigflow_db::{
    DeploymentLogEntry, DeploymentLogStatus, DeploymentOperation, DeploymentRecord,
    DeploymentStatus,
};
