//! sigflow Core Library
//!
//! Identifier types and tenant traits shared by every sigflow crate.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`TenantId`, `DeploymentRecordId`, `DeploymentLogId`)
//! - [`traits`] - Multi-tenant traits (`TenantAware`)
//!
//! # Example
//!
//! ```
//! use sigflow_core::{TenantAware, TenantId};
//!
//! struct RuleRequest {
//!     tenant_id: TenantId,
//! }
//!
//! impl TenantAware for RuleRequest {
//!     fn tenant_id(&self) -> TenantId {
//!         self.tenant_id
//!     }
//! }
//!
//! let tenant = TenantId::new();
//! assert_eq!(RuleRequest { tenant_id: tenant }.tenant_id(), tenant);
//! ```

pub mod ids;
pub mod traits;

pub use ids::{DeploymentLogId, DeploymentRecordId, ParseIdError, TenantId};
pub use traits::TenantAware;
