//! Multi-Tenant Traits
//!
//! Entities that belong to exactly one tenant implement [`TenantAware`].

use crate::ids::TenantId;

/// Trait for entities that belong to a specific tenant.
///
/// # Example
///
/// ```
/// use sigflow_core::{TenantAware, TenantId};
///
/// struct Disclaimer {
///     tenant_id: TenantId,
/// }
///
/// impl TenantAware for Disclaimer {
///     fn tenant_id(&self) -> TenantId {
///         self.tenant_id
///     }
/// }
///
/// let tenant = TenantId::new();
/// let d = Disclaimer { tenant_id: tenant };
/// assert_eq!(d.tenant_id(), tenant);
/// ```
pub trait TenantAware {
    /// Returns the tenant ID associated with this entity.
    fn tenant_id(&self) -> TenantId;
}
