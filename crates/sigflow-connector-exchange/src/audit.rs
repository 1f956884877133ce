//! Append-only deployment audit log.

use chrono::{DateTime, Utc};
use sigflow_core::TenantId;
use sigflow_db::{
    CreateDeploymentLogEntry, DeploymentLogEntry, DeploymentLogStatus, DeploymentOperation,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::store::DeploymentLogStore;
use crate::ExchangeResult;

/// One connector operation outcome, before it is timestamped.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub tenant_id: TenantId,
    pub operation: DeploymentOperation,
    pub status: DeploymentLogStatus,
    pub rule_name: Option<String>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub execution_time_ms: i64,
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        operation: DeploymentOperation,
        status: DeploymentLogStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            operation,
            status,
            rule_name: None,
            message: message.into(),
            details: None,
            execution_time_ms: 0,
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the execution time from the operation start.
    #[must_use]
    pub fn timed(mut self, started: Instant) -> Self {
        self.execution_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self
    }
}

/// Audit log shared by every tenant connector.
///
/// `record` never fails the caller: a failed write is reported through
/// `tracing::error!` and dropped. Timestamps are non-decreasing per tenant.
pub struct DeploymentAuditLog {
    store: Arc<dyn DeploymentLogStore>,
    last_timestamps: Mutex<HashMap<TenantId, DateTime<Utc>>>,
}

impl DeploymentAuditLog {
    #[must_use]
    pub fn new(store: Arc<dyn DeploymentLogStore>) -> Self {
        Self {
            store,
            last_timestamps: Mutex::new(HashMap::new()),
        }
    }

    async fn next_timestamp(&self, tenant_id: TenantId) -> DateTime<Utc> {
        let mut last = self.last_timestamps.lock().await;
        let now = Utc::now();
        let timestamp = match last.get(&tenant_id) {
            Some(previous) if *previous > now => *previous,
            _ => now,
        };
        last.insert(tenant_id, timestamp);
        timestamp
    }

    /// Appends an entry.
    pub async fn record(&self, entry: AuditEntry) {
        let created_at = self.next_timestamp(entry.tenant_id).await;
        let tenant_id = entry.tenant_id;
        let operation = entry.operation;

        let result = self
            .store
            .append(CreateDeploymentLogEntry {
                tenant_id: *entry.tenant_id.as_uuid(),
                operation: entry.operation,
                status: entry.status,
                rule_name: entry.rule_name,
                message: entry.message,
                details: entry.details,
                execution_time_ms: entry.execution_time_ms,
                created_at,
            })
            .await;

        match result {
            Ok(stored) => debug!(
                tenant_id = %tenant_id,
                operation = %operation,
                entry_id = %stored.id,
                "Recorded deployment log entry"
            ),
            Err(e) => error!(
                tenant_id = %tenant_id,
                operation = %operation,
                error = %e,
                "Failed to write deployment log entry"
            ),
        }
    }

    /// Most recent entries of a tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Storage` if the store cannot be read.
    pub async fn list(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> ExchangeResult<Vec<DeploymentLogEntry>> {
        self.store.list(tenant_id, limit).await
    }
}

impl std::fmt::Debug for DeploymentAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentAuditLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDeploymentStore;
    use crate::ExchangeError;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct FailingStore;

    #[async_trait]
    impl DeploymentLogStore for FailingStore {
        async fn append(
            &self,
            _entry: CreateDeploymentLogEntry,
        ) -> ExchangeResult<DeploymentLogEntry> {
            Err(ExchangeError::Storage("disk full".to_string()))
        }

        async fn list(
            &self,
            _tenant_id: TenantId,
            _limit: usize,
        ) -> ExchangeResult<Vec<DeploymentLogEntry>> {
            Ok(Vec::new())
        }
    }

    fn entry(tenant: TenantId, message: &str) -> AuditEntry {
        AuditEntry::new(
            tenant,
            DeploymentOperation::Deploy,
            DeploymentLogStatus::Success,
            message,
        )
        .with_rule("Signature")
    }

    #[tokio::test]
    async fn test_write_failure_does_not_propagate() {
        let audit = DeploymentAuditLog::new(Arc::new(FailingStore));
        audit.record(entry(TenantId::new(), "ok")).await;
    }

    #[tokio::test]
    async fn test_timestamps_are_monotonic_per_tenant() {
        let store = Arc::new(InMemoryDeploymentStore::new());
        let audit = DeploymentAuditLog::new(store.clone());
        let tenant = TenantId::new();

        for i in 0..20 {
            audit.record(entry(tenant, &format!("entry {i}"))).await;
        }

        let entries = audit.list(tenant, 100).await.unwrap();
        assert_eq!(entries.len(), 20);
        for pair in entries.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
        assert_eq!(entries[0].message, "entry 19");
    }

    #[tokio::test]
    async fn test_entries_keep_their_tenant() {
        let store = Arc::new(InMemoryDeploymentStore::new());
        let audit = DeploymentAuditLog::new(store.clone());
        let a = TenantId::new();
        let b = TenantId::new();

        audit.record(entry(a, "a")).await;
        audit.record(entry(b, "b")).await;

        let listed = audit.list(a, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tenant_id, *a.as_uuid());
        assert_eq!(store.log_count().await, 2);
    }
}
