//! Create-or-update reconciliation of disclaimer rules.
//!
//! The reconciler looks a rule up by exact name, then updates it in place or
//! creates it. The idempotency key is `(tenant, rule name)`: the remote id is
//! unknown until creation. When the remote surface answers a call with
//! `UnsupportedOperation`, or the connector runs in script-only mode, the
//! mutation is handed to the [`FallbackScriptGenerator`] and the rule is
//! tracked as awaiting manual execution.
//!
//! A name lookup followed by a create is read-then-act. Calls for the same
//! rule within one reconciler are serialised, but two processes can still race
//! into a duplicate remote rule; the local record stays consistent through the
//! store's last-writer-wins upsert.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sigflow_db::{
    DeploymentLogStatus, DeploymentOperation, DeploymentStatus, UpsertDeploymentRecord,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditEntry, DeploymentAuditLog};
use crate::auth::TokenScope;
use crate::config::RuleMutationMode;
use crate::management_client::ManagementClient;
use crate::rule::{RemoteTransportRule, RuleSpec};
use crate::script::{self, FallbackScriptGenerator, ScriptOperation};
use crate::store::DeploymentRecordStore;
use crate::{ExchangeError, ExchangeResult};

/// Phases of one deployment attempt, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentPhase {
    Pending,
    Authenticating,
    Reconciling,
    Deployed,
    Unsupported,
    ScriptGenerated,
    Failed,
}

/// Result shape shared by live deployments and script fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl DeploymentResult {
    fn succeeded(message: String, rule_id: Option<String>) -> Self {
        Self {
            success: true,
            message,
            rule_id,
            errors: None,
        }
    }

    fn failed(error: &ExchangeError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            rule_id: None,
            errors: Some(error.messages()),
        }
    }
}

#[derive(Debug)]
enum DeployOutcome {
    Deployed { rule_id: String, created: bool },
    ScriptGenerated { operation: ScriptOperation, reason: String },
}

#[derive(Debug)]
enum RemoveOutcome {
    Deleted { rule_id: Option<String> },
    ScriptGenerated { reason: String },
    NothingToRemove,
}

fn phase(rule_name: &str, phase: DeploymentPhase) {
    debug!(rule_name = %rule_name, phase = ?phase, "Deployment phase");
}

/// Reconciles rules of exactly one tenant.
pub struct RuleReconciler {
    client: Arc<ManagementClient>,
    scripts: FallbackScriptGenerator,
    records: Arc<dyn DeploymentRecordStore>,
    audit: Arc<DeploymentAuditLog>,
    rule_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RuleReconciler {
    #[must_use]
    pub fn new(
        client: Arc<ManagementClient>,
        scripts: FallbackScriptGenerator,
        records: Arc<dyn DeploymentRecordStore>,
        audit: Arc<DeploymentAuditLog>,
    ) -> Self {
        Self {
            client,
            scripts,
            records,
            audit,
            rule_locks: Mutex::new(HashMap::new()),
        }
    }

    fn tenant_id(&self) -> sigflow_core::TenantId {
        self.client.credential().tenant_id
    }

    async fn rule_lock(&self, rule_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.rule_locks.lock().await;
        locks.entry(rule_name.to_string()).or_default().clone()
    }

    /// Runs `work` under the rule's lock and the operation deadline.
    async fn guarded<T, F>(&self, rule_name: &str, work: F) -> ExchangeResult<T>
    where
        F: Future<Output = ExchangeResult<T>>,
    {
        let timeout = self.client.config().operation_timeout;
        let locked = async {
            let lock = self.rule_lock(rule_name).await;
            let _guard = lock.lock().await;
            work.await
        };
        match tokio::time::timeout(timeout, locked).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Deploys a rule. Produces exactly one audit entry.
    #[instrument(skip(self, spec), fields(tenant_id = %self.tenant_id(), rule_name = %spec.name))]
    pub async fn deploy(&self, spec: &RuleSpec) -> DeploymentResult {
        let started = Instant::now();
        phase(&spec.name, DeploymentPhase::Pending);

        let outcome = self.guarded(&spec.name, self.deploy_inner(spec)).await;

        let (result, entry) = match outcome {
            Ok(DeployOutcome::Deployed { rule_id, created }) => {
                phase(&spec.name, DeploymentPhase::Deployed);
                let action = if created { "created" } else { "updated" };
                let message = format!(
                    "Transport rule '{}' {action} (remote id {rule_id})",
                    spec.name
                );
                info!(rule_id = %rule_id, action, "Rule deployed");
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Deploy,
                    DeploymentLogStatus::Success,
                    message.clone(),
                )
                .with_details(serde_json::json!({
                    "action": action,
                    "remoteRuleId": rule_id,
                    "contentHash": spec.content_hash(),
                }));
                (DeploymentResult::succeeded(message, Some(rule_id)), entry)
            }
            Ok(DeployOutcome::ScriptGenerated { operation, reason }) => {
                phase(&spec.name, DeploymentPhase::ScriptGenerated);
                let message = format!(
                    "{reason}; generated an administrator script ({}) for rule '{}' \
                     that requires manual execution",
                    operation.as_str(),
                    spec.name
                );
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Deploy,
                    DeploymentLogStatus::Warning,
                    message.clone(),
                )
                .with_details(serde_json::json!({
                    "action": "script",
                    "scriptOperation": operation,
                    "recordStatus": DeploymentStatus::PendingManualExecution,
                }));
                (DeploymentResult::succeeded(message, None), entry)
            }
            Err(e) => {
                phase(&spec.name, DeploymentPhase::Failed);
                warn!(error = %e, code = e.error_code(), "Deployment failed");
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Deploy,
                    DeploymentLogStatus::Error,
                    e.to_string(),
                )
                .with_details(serde_json::json!({
                    "errorCode": e.error_code(),
                    "errors": e.messages(),
                }));
                (DeploymentResult::failed(&e), entry)
            }
        };

        self.audit
            .record(entry.with_rule(spec.name.clone()).timed(started))
            .await;
        result
    }

    async fn deploy_inner(&self, spec: &RuleSpec) -> ExchangeResult<DeployOutcome> {
        spec.validate()?;
        self.ensure_enabled()?;

        if self.client.config().mutation_mode == RuleMutationMode::ScriptOnly {
            let operation = match self.records.find(self.tenant_id(), &spec.name).await? {
                Some(record) if record.status != DeploymentStatus::Deleted => {
                    ScriptOperation::Update
                }
                _ => ScriptOperation::Create,
            };
            return self
                .deploy_script(
                    spec,
                    operation,
                    "Connector runs in script-only mode".to_string(),
                )
                .await;
        }

        phase(&spec.name, DeploymentPhase::Authenticating);
        self.client.token(TokenScope::MailManagement).await?;

        phase(&spec.name, DeploymentPhase::Reconciling);
        let existing = match self.find_remote(&spec.name).await {
            Ok(existing) => existing,
            Err(e) if e.is_unsupported() => {
                return self
                    .deploy_script(spec, ScriptOperation::Create, unsupported_reason(&e))
                    .await;
            }
            Err(e) => return Err(e),
        };

        let body = spec.to_remote_body();
        let mutation = match &existing {
            Some(rule) => {
                debug!(rule_id = %rule.id, "Updating existing remote rule");
                let url = self
                    .client
                    .config()
                    .transport_rule_url(self.directory_tenant(), &rule.id)?;
                self.client
                    .put(TokenScope::MailManagement, &url, &body)
                    .await
                    .map(|()| (rule.id.clone(), false))
            }
            None => {
                debug!("Creating remote rule");
                let url = self.rules_url();
                self.client
                    .post::<RemoteTransportRule, _>(TokenScope::MailManagement, &url, &body)
                    .await
                    .map(|created| (created.id, true))
            }
        };

        let (rule_id, created) = match mutation {
            Ok(done) => done,
            Err(e) if e.is_unsupported() => {
                let operation = if existing.is_some() {
                    ScriptOperation::Update
                } else {
                    ScriptOperation::Create
                };
                return self
                    .deploy_script(spec, operation, unsupported_reason(&e))
                    .await;
            }
            Err(e) => return Err(e),
        };

        self.records
            .upsert(UpsertDeploymentRecord {
                tenant_id: *self.tenant_id().as_uuid(),
                rule_name: spec.name.clone(),
                remote_rule_id: Some(rule_id.clone()),
                status: DeploymentStatus::Deployed,
                content_hash: spec.content_hash(),
                script_text: None,
                deployed_at: Utc::now(),
            })
            .await?;

        Ok(DeployOutcome::Deployed { rule_id, created })
    }

    async fn deploy_script(
        &self,
        spec: &RuleSpec,
        operation: ScriptOperation,
        reason: String,
    ) -> ExchangeResult<DeployOutcome> {
        phase(&spec.name, DeploymentPhase::Unsupported);
        let generated = script::render(spec, operation);
        self.scripts
            .persist(&spec.name, spec.content_hash(), &generated)
            .await?;
        Ok(DeployOutcome::ScriptGenerated { operation, reason })
    }

    /// Removes a rule. Produces exactly one audit entry.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id()))]
    pub async fn remove(&self, rule_name: &str) -> DeploymentResult {
        let started = Instant::now();
        phase(rule_name, DeploymentPhase::Pending);

        let outcome = self.guarded(rule_name, self.remove_inner(rule_name)).await;

        let (result, entry) = match outcome {
            Ok(RemoveOutcome::Deleted { rule_id }) => {
                let message = format!("Transport rule '{rule_name}' removed");
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Remove,
                    DeploymentLogStatus::Success,
                    message.clone(),
                )
                .with_details(serde_json::json!({ "remoteRuleId": rule_id }));
                (DeploymentResult::succeeded(message, rule_id), entry)
            }
            Ok(RemoveOutcome::ScriptGenerated { reason }) => {
                phase(rule_name, DeploymentPhase::ScriptGenerated);
                let message = format!(
                    "{reason}; generated an administrator script (delete) for rule \
                     '{rule_name}' that requires manual execution"
                );
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Remove,
                    DeploymentLogStatus::Warning,
                    message.clone(),
                )
                .with_details(serde_json::json!({
                    "action": "script",
                    "recordStatus": DeploymentStatus::PendingDeletion,
                }));
                (DeploymentResult::succeeded(message, None), entry)
            }
            Ok(RemoveOutcome::NothingToRemove) => {
                let message =
                    format!("Transport rule '{rule_name}' does not exist; nothing to remove");
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Remove,
                    DeploymentLogStatus::Success,
                    message.clone(),
                );
                (DeploymentResult::succeeded(message, None), entry)
            }
            Err(e) => {
                phase(rule_name, DeploymentPhase::Failed);
                warn!(error = %e, code = e.error_code(), "Removal failed");
                let entry = AuditEntry::new(
                    self.tenant_id(),
                    DeploymentOperation::Remove,
                    DeploymentLogStatus::Error,
                    e.to_string(),
                )
                .with_details(serde_json::json!({ "errorCode": e.error_code() }));
                (DeploymentResult::failed(&e), entry)
            }
        };

        self.audit
            .record(entry.with_rule(rule_name).timed(started))
            .await;
        result
    }

    async fn remove_inner(&self, rule_name: &str) -> ExchangeResult<RemoveOutcome> {
        crate::rule::validate_rule_name(rule_name)?;
        self.ensure_enabled()?;

        let local = self.records.find(self.tenant_id(), rule_name).await?;
        let content_hash = local
            .as_ref()
            .map(|r| r.content_hash.clone())
            .unwrap_or_default();
        let locally_deleted = local
            .as_ref()
            .is_some_and(|r| !r.status.can_transition_to(DeploymentStatus::PendingDeletion));

        if self.client.config().mutation_mode == RuleMutationMode::ScriptOnly {
            if locally_deleted {
                return Ok(RemoveOutcome::NothingToRemove);
            }
            return self
                .remove_script(
                    rule_name,
                    content_hash,
                    "Connector runs in script-only mode".to_string(),
                )
                .await;
        }

        phase(rule_name, DeploymentPhase::Authenticating);
        self.client.token(TokenScope::MailManagement).await?;

        phase(rule_name, DeploymentPhase::Reconciling);
        let existing = match self.find_remote(rule_name).await {
            Ok(existing) => existing,
            Err(e) if e.is_unsupported() => {
                return self
                    .remove_script(rule_name, content_hash, unsupported_reason(&e))
                    .await;
            }
            Err(e) => return Err(e),
        };

        let rule_id = match existing {
            Some(rule) => {
                let url = self
                    .client
                    .config()
                    .transport_rule_url(self.directory_tenant(), &rule.id)?;
                match self.client.delete(TokenScope::MailManagement, &url).await {
                    Ok(()) => Some(rule.id),
                    Err(e) if e.is_unsupported() => {
                        return self
                            .remove_script(rule_name, content_hash, unsupported_reason(&e))
                            .await;
                    }
                    Err(e) => return Err(e),
                }
            }
            None if local.is_none() || locally_deleted => {
                return Ok(RemoveOutcome::NothingToRemove);
            }
            None => {
                info!(rule_name = %rule_name, "Remote rule already gone; marking record deleted");
                local.as_ref().and_then(|r| r.remote_rule_id.clone())
            }
        };

        self.records
            .upsert(UpsertDeploymentRecord {
                tenant_id: *self.tenant_id().as_uuid(),
                rule_name: rule_name.to_string(),
                remote_rule_id: rule_id.clone(),
                status: DeploymentStatus::Deleted,
                content_hash,
                script_text: None,
                deployed_at: Utc::now(),
            })
            .await?;

        Ok(RemoveOutcome::Deleted { rule_id })
    }

    async fn remove_script(
        &self,
        rule_name: &str,
        content_hash: String,
        reason: String,
    ) -> ExchangeResult<RemoveOutcome> {
        phase(rule_name, DeploymentPhase::Unsupported);
        let generated = script::GeneratedScript {
            script_text: script::render_removal(rule_name),
            record_status: ScriptOperation::Delete.record_status(),
        };
        self.scripts
            .persist(rule_name, content_hash, &generated)
            .await?;
        Ok(RemoveOutcome::ScriptGenerated { reason })
    }

    /// Looks a rule up by exact, case-sensitive name.
    async fn find_remote(&self, rule_name: &str) -> ExchangeResult<Option<RemoteTransportRule>> {
        let rules: Vec<RemoteTransportRule> = self
            .client
            .get_all(TokenScope::MailManagement, &self.rules_url())
            .await?;

        let mut matches: Vec<RemoteTransportRule> =
            rules.into_iter().filter(|r| r.name == rule_name).collect();

        if matches.len() > 1 {
            let ids: Vec<&str> = matches.iter().map(|r| r.id.as_str()).collect();
            return Err(ExchangeError::RemoteState(format!(
                "{} remote rules are named '{rule_name}': {}",
                matches.len(),
                ids.join(", ")
            )));
        }
        Ok(matches.pop())
    }

    fn ensure_enabled(&self) -> ExchangeResult<()> {
        if self.client.credential().connection_enabled {
            Ok(())
        } else {
            Err(ExchangeError::Config(
                "the mail system connection is disabled for this organization".to_string(),
            ))
        }
    }

    fn directory_tenant(&self) -> &str {
        &self.client.credential().directory_tenant_id
    }

    fn rules_url(&self) -> String {
        self.client
            .config()
            .transport_rules_url(self.directory_tenant())
    }
}

fn unsupported_reason(error: &ExchangeError) -> String {
    match error {
        ExchangeError::UnsupportedOperation { message, .. } => {
            format!("Remote surface does not support transport rule changes ({message})")
        }
        other => other.to_string(),
    }
}

impl std::fmt::Debug for RuleReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleReconciler")
            .field("tenant_id", &self.tenant_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_shape_omits_absent_fields() {
        let result = DeploymentResult::succeeded("done".to_string(), None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "message": "done"}));
    }

    #[test]
    fn test_failed_result_lists_errors() {
        let err = ExchangeError::Validation {
            errors: vec!["a".to_string(), "b".to_string()],
        };
        let json = serde_json::to_value(DeploymentResult::failed(&err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"], serde_json::json!(["a", "b"]));
        assert!(json.get("ruleId").is_none());
    }

    #[test]
    fn test_unsupported_reason_carries_remote_message() {
        let err = ExchangeError::UnsupportedOperation {
            operation: "POST".to_string(),
            message: "New-TransportRule is not available".to_string(),
        };
        assert!(unsupported_reason(&err).contains("New-TransportRule is not available"));
    }
}
