//! Deployment audit log model.
//!
//! Append-only: rows are inserted and read, never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, Type};
use uuid::Uuid;

/// Outcome class of a logged connector operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "deployment_log_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentLogStatus {
    Success,
    Error,
    /// Completed, but an administrator still has to act (script fallback).
    Warning,
}

impl DeploymentLogStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentLogStatus::Success => "success",
            DeploymentLogStatus::Error => "error",
            DeploymentLogStatus::Warning => "warning",
        }
    }
}

impl std::fmt::Display for DeploymentLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector operation that produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "deployment_operation", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOperation {
    TestConnection,
    Deploy,
    Remove,
    GenerateScript,
}

impl DeploymentOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentOperation::TestConnection => "test_connection",
            DeploymentOperation::Deploy => "deploy",
            DeploymentOperation::Remove => "remove",
            DeploymentOperation::GenerateScript => "generate_script",
        }
    }
}

impl std::fmt::Display for DeploymentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DeploymentLogEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub operation: DeploymentOperation,
    pub status: DeploymentLogStatus,
    pub rule_name: Option<String>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub execution_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Request to append an audit entry. `created_at` is assigned by the caller so
/// that per-tenant ordering is decided before the write races other appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDeploymentLogEntry {
    pub tenant_id: Uuid,
    pub operation: DeploymentOperation,
    pub status: DeploymentLogStatus,
    pub rule_name: Option<String>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub execution_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl DeploymentLogEntry {
    /// Append a new entry.
    pub async fn create<'e, E>(
        executor: E,
        params: CreateDeploymentLogEntry,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO deployment_logs (
                id, tenant_id, operation, status, rule_name, message,
                details, execution_time_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, tenant_id, operation, status, rule_name, message,
                      details, execution_time_ms, created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(params.tenant_id)
        .bind(params.operation)
        .bind(params.status)
        .bind(&params.rule_name)
        .bind(&params.message)
        .bind(&params.details)
        .bind(params.execution_time_ms)
        .bind(params.created_at)
        .fetch_one(executor)
        .await
    }

    /// Most recent entries of a tenant, newest first.
    pub async fn list_by_tenant<'e, E>(
        executor: E,
        tenant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT id, tenant_id, operation, status, rule_name, message,
                   details, execution_time_ms, created_at
            FROM deployment_logs
            WHERE tenant_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2
            ",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(executor)
        .await
    }
}
