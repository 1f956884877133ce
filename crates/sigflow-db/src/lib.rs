//! sigflow persistence layer.
//!
//! Postgres models for the three tables the deployment connector touches:
//!
//! - [`models::deployment_record`] - one row per `(tenant, rule name)`, tracking
//!   whether a disclaimer rule is live, awaiting manual execution, or deleted
//! - [`models::deployment_log`] - the append-only deployment audit trail
//! - [`models::tenant_connector_settings`] - per-tenant directory credentials
//!
//! Every method takes a `PgPool` or executor; there is no hidden global state.

pub mod error;
pub mod migrations;
pub mod models;

pub use error::DbError;
pub use migrations::run_migrations;
pub use models::deployment_log::{
    CreateDeploymentLogEntry, DeploymentLogEntry, DeploymentLogStatus, DeploymentOperation,
};
pub use models::deployment_record::{DeploymentRecord, DeploymentStatus, UpsertDeploymentRecord};
pub use models::tenant_connector_settings::{TenantConnectorSettings, UpsertConnectorSettings};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connects to Postgres with a small pool suitable for the connector.
///
/// # Errors
///
/// Returns `DbError::ConnectionFailed` if the database is unreachable.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)
}
