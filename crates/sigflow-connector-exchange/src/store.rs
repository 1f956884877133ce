//! Persistence seams for deployment records and audit entries.
//!
//! The connector only needs keyed reads, upserts and appends, so both stores
//! are small traits. [`PgDeploymentStore`] backs them with `sigflow-db`;
//! [`InMemoryDeploymentStore`] is used by the CLI without a database and by
//! tests.

use async_trait::async_trait;
use chrono::Utc;
use sigflow_core::{DeploymentLogId, DeploymentRecordId, TenantId};
use sigflow_db::{
    CreateDeploymentLogEntry, DeploymentLogEntry, DeploymentRecord, UpsertDeploymentRecord,
};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::ExchangeResult;

/// Keyed store of deployment records.
#[async_trait]
pub trait DeploymentRecordStore: Send + Sync + std::fmt::Debug {
    /// Record of one rule within a tenant.
    async fn find(&self, tenant_id: TenantId, rule_name: &str)
        -> ExchangeResult<Option<DeploymentRecord>>;

    /// Last-writer-wins upsert keyed by `(tenant_id, rule_name)`.
    ///
    /// A write older than the stored `last_deployed_at` is discarded and the
    /// stored record is returned.
    async fn upsert(&self, params: UpsertDeploymentRecord) -> ExchangeResult<DeploymentRecord>;

    /// Every record of a tenant, most recently deployed first.
    async fn list(&self, tenant_id: TenantId) -> ExchangeResult<Vec<DeploymentRecord>>;
}

/// Append-only store of audit entries.
#[async_trait]
pub trait DeploymentLogStore: Send + Sync + std::fmt::Debug {
    async fn append(&self, entry: CreateDeploymentLogEntry) -> ExchangeResult<DeploymentLogEntry>;

    /// Most recent entries of a tenant, newest first.
    async fn list(&self, tenant_id: TenantId, limit: usize)
        -> ExchangeResult<Vec<DeploymentLogEntry>>;
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgDeploymentStore {
    pool: PgPool,
}

impl PgDeploymentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DeploymentRecordStore for PgDeploymentStore {
    async fn find(
        &self,
        tenant_id: TenantId,
        rule_name: &str,
    ) -> ExchangeResult<Option<DeploymentRecord>> {
        Ok(DeploymentRecord::find_by_name(&self.pool, *tenant_id.as_uuid(), rule_name).await?)
    }

    async fn upsert(&self, params: UpsertDeploymentRecord) -> ExchangeResult<DeploymentRecord> {
        Ok(DeploymentRecord::upsert(&self.pool, params).await?)
    }

    async fn list(&self, tenant_id: TenantId) -> ExchangeResult<Vec<DeploymentRecord>> {
        Ok(DeploymentRecord::list_by_tenant(&self.pool, *tenant_id.as_uuid()).await?)
    }
}

#[async_trait]
impl DeploymentLogStore for PgDeploymentStore {
    async fn append(&self, entry: CreateDeploymentLogEntry) -> ExchangeResult<DeploymentLogEntry> {
        Ok(DeploymentLogEntry::create(&self.pool, entry).await?)
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> ExchangeResult<Vec<DeploymentLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(DeploymentLogEntry::list_by_tenant(&self.pool, *tenant_id.as_uuid(), limit).await?)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryDeploymentStore {
    records: RwLock<HashMap<(Uuid, String), DeploymentRecord>>,
    logs: RwLock<Vec<DeploymentLogEntry>>,
}

impl InMemoryDeploymentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of audit entries across all tenants.
    pub async fn log_count(&self) -> usize {
        self.logs.read().await.len()
    }

    /// Total number of records across all tenants.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl DeploymentRecordStore for InMemoryDeploymentStore {
    async fn find(
        &self,
        tenant_id: TenantId,
        rule_name: &str,
    ) -> ExchangeResult<Option<DeploymentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(*tenant_id.as_uuid(), rule_name.to_string()))
            .cloned())
    }

    async fn upsert(&self, params: UpsertDeploymentRecord) -> ExchangeResult<DeploymentRecord> {
        let mut records = self.records.write().await;
        let key = (params.tenant_id, params.rule_name.clone());

        let record = match records.get(&key) {
            Some(existing) if existing.last_deployed_at > params.deployed_at => {
                warn!(
                    tenant_id = %params.tenant_id,
                    rule_name = %params.rule_name,
                    "Discarded stale deployment record write"
                );
                return Ok(existing.clone());
            }
            Some(existing) => DeploymentRecord {
                remote_rule_id: params.remote_rule_id,
                status: params.status,
                content_hash: params.content_hash,
                script_text: params.script_text,
                version: existing.version + 1,
                last_deployed_at: params.deployed_at,
                ..existing.clone()
            },
            None => DeploymentRecord {
                id: DeploymentRecordId::new().into(),
                tenant_id: params.tenant_id,
                rule_name: params.rule_name,
                remote_rule_id: params.remote_rule_id,
                status: params.status,
                content_hash: params.content_hash,
                script_text: params.script_text,
                version: 1,
                last_deployed_at: params.deployed_at,
                created_at: Utc::now(),
            },
        };

        records.insert(key, record.clone());
        Ok(record)
    }

    async fn list(&self, tenant_id: TenantId) -> ExchangeResult<Vec<DeploymentRecord>> {
        let records = self.records.read().await;
        let mut items: Vec<_> = records
            .values()
            .filter(|r| r.tenant_id == *tenant_id.as_uuid())
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.last_deployed_at
                .cmp(&a.last_deployed_at)
                .then_with(|| a.rule_name.cmp(&b.rule_name))
        });
        Ok(items)
    }
}

#[async_trait]
impl DeploymentLogStore for InMemoryDeploymentStore {
    async fn append(&self, entry: CreateDeploymentLogEntry) -> ExchangeResult<DeploymentLogEntry> {
        let stored = DeploymentLogEntry {
            id: DeploymentLogId::new().into(),
            tenant_id: entry.tenant_id,
            operation: entry.operation,
            status: entry.status,
            rule_name: entry.rule_name,
            message: entry.message,
            details: entry.details,
            execution_time_ms: entry.execution_time_ms,
            created_at: entry.created_at,
        };
        self.logs.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> ExchangeResult<Vec<DeploymentLogEntry>> {
        let logs = self.logs.read().await;
        // Newest insert first among equal timestamps.
        let mut items: Vec<_> = logs
            .iter()
            .rev()
            .filter(|e| e.tenant_id == *tenant_id.as_uuid())
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }
}
