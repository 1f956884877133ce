//! Administrator script generation for surfaces that refuse rule mutation.
//!
//! Scripts target the mail system's PowerShell module. Every value is emitted
//! as a single-quoted literal, in which the only special characters are the
//! single quotes themselves (including the typographic variants PowerShell
//! also accepts). Doubling them is the whole escape, which keeps the literal
//! reversible: [`extract_disclaimer`] recovers the original HTML exactly.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sigflow_core::TenantId;
use sigflow_db::{
    DeploymentLogStatus, DeploymentOperation, DeploymentStatus, UpsertDeploymentRecord,
};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::audit::{AuditEntry, DeploymentAuditLog};
use crate::rule::RuleSpec;
use crate::store::DeploymentRecordStore;
use crate::ExchangeResult;

/// Characters PowerShell treats as a single quote.
const SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

const DISCLAIMER_ASSIGNMENT: &str = "$DisclaimerHtml = ";

/// Remote mutation a script performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOperation {
    Create,
    Update,
    Delete,
}

impl ScriptOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptOperation::Create => "create",
            ScriptOperation::Update => "update",
            ScriptOperation::Delete => "delete",
        }
    }

    /// Record status the script leaves the rule in until it is run.
    #[must_use]
    pub fn record_status(&self) -> DeploymentStatus {
        match self {
            ScriptOperation::Create | ScriptOperation::Update => {
                DeploymentStatus::PendingManualExecution
            }
            ScriptOperation::Delete => DeploymentStatus::PendingDeletion,
        }
    }
}

/// A rendered script and the status its record takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub script_text: String,
    pub record_status: DeploymentStatus,
}

/// Quotes a value as a PowerShell single-quoted literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        out.push(c);
        if SINGLE_QUOTES.contains(&c) {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Reads a single-quoted literal at the start of `input`, returning its value.
fn read_literal(input: &str) -> Option<String> {
    let mut chars = input.chars().peekable();
    if chars.next()? != '\'' {
        return None;
    }

    let mut value = String::new();
    while let Some(c) = chars.next() {
        if SINGLE_QUOTES.contains(&c) {
            if chars.peek() == Some(&c) {
                chars.next();
                value.push(c);
            } else {
                return Some(value);
            }
        } else {
            value.push(c);
        }
    }
    None
}

/// Recovers the disclaimer HTML embedded in a generated script.
#[must_use]
pub fn extract_disclaimer(script: &str) -> Option<String> {
    let marker = format!("\n{DISCLAIMER_ASSIGNMENT}");
    let start = script.find(&marker)? + marker.len();
    read_literal(&script[start..])
}

fn header(out: &mut String, operation: ScriptOperation) {
    let _ = writeln!(out, "# sigflow transport rule script");
    let _ = writeln!(out, "# Operation: {}", operation.as_str());
    let _ = writeln!(out, "# Generated: {}", Utc::now().to_rfc3339());
    let _ = writeln!(
        out,
        "# Run in a mail administration PowerShell session (Connect-ExchangeOnline)."
    );
    let _ = writeln!(out, "# Safe to run more than once.");
    out.push('\n');
    out.push_str("$ErrorActionPreference = 'Stop'\n\n");
}

fn lookup_block(out: &mut String) {
    out.push_str(
        "$Existing = @(Get-TransportRule -ResultSize Unlimited | Where-Object { $_.Name -ceq $RuleName })\n\
         if ($Existing.Count -gt 1) {\n\
         \x20   throw \"More than one transport rule is named '$RuleName'. Remove the duplicates and run this script again.\"\n\
         }\n\n",
    );
}

/// Renders a create-or-update script. `operation` is recorded in the header;
/// the script itself always branches on what exists when it runs.
#[must_use]
pub fn render_upsert(spec: &RuleSpec, operation: ScriptOperation) -> String {
    let mut out = String::new();
    header(&mut out, operation);

    let _ = writeln!(out, "$RuleName = {}", quote_literal(&spec.name));
    let _ = writeln!(
        out,
        "{DISCLAIMER_ASSIGNMENT}{}",
        quote_literal(&spec.disclaimer_html)
    );
    out.push('\n');

    out.push_str("$RuleParameters = @{\n");
    let _ = writeln!(out, "    Comments = {}", quote_literal(&spec.description));
    if let Some(scope) = spec.from_scope {
        let _ = writeln!(out, "    FromScope = '{}'", scope.as_str());
    }
    if let Some(scope) = spec.sent_to_scope {
        let _ = writeln!(out, "    SentToScope = '{}'", scope.as_str());
    }
    let _ = writeln!(
        out,
        "    ApplyHtmlDisclaimerLocation = '{}'",
        spec.location.as_str()
    );
    out.push_str("    ApplyHtmlDisclaimerText = $DisclaimerHtml\n");
    let _ = writeln!(
        out,
        "    ApplyHtmlDisclaimerFallbackAction = '{}'",
        spec.fallback_action.as_str()
    );
    let _ = writeln!(out, "    Priority = {}", spec.priority);
    out.push_str("}\n\n");

    lookup_block(&mut out);

    out.push_str(
        "if ($Existing.Count -eq 1) {\n\
         \x20   Set-TransportRule -Identity $Existing[0].Identity @RuleParameters\n\
         \x20   Write-Host \"Updated transport rule '$RuleName'.\"\n\
         } else {\n\
         \x20   New-TransportRule -Name $RuleName @RuleParameters | Out-Null\n\
         \x20   Write-Host \"Created transport rule '$RuleName'.\"\n\
         }\n\n",
    );

    let toggle = if spec.enabled {
        "Enable-TransportRule"
    } else {
        "Disable-TransportRule"
    };
    let _ = writeln!(out, "{toggle} -Identity $RuleName -Confirm:$false");
    out
}

/// Renders a removal script.
#[must_use]
pub fn render_removal(rule_name: &str) -> String {
    let mut out = String::new();
    header(&mut out, ScriptOperation::Delete);

    let _ = writeln!(out, "$RuleName = {}", quote_literal(rule_name));
    out.push('\n');

    lookup_block(&mut out);

    out.push_str(
        "if ($Existing.Count -eq 1) {\n\
         \x20   Remove-TransportRule -Identity $Existing[0].Identity -Confirm:$false\n\
         \x20   Write-Host \"Removed transport rule '$RuleName'.\"\n\
         } else {\n\
         \x20   Write-Host \"Transport rule '$RuleName' does not exist; nothing to remove.\"\n\
         }\n",
    );
    out
}

/// Renders a script without persisting anything.
#[must_use]
pub fn render(spec: &RuleSpec, operation: ScriptOperation) -> GeneratedScript {
    let script_text = match operation {
        ScriptOperation::Create | ScriptOperation::Update => render_upsert(spec, operation),
        ScriptOperation::Delete => render_removal(&spec.name),
    };
    GeneratedScript {
        script_text,
        record_status: operation.record_status(),
    }
}

/// Generates scripts for one tenant and persists them on the rule's record.
#[derive(Clone)]
pub struct FallbackScriptGenerator {
    tenant_id: TenantId,
    records: Arc<dyn DeploymentRecordStore>,
    audit: Arc<DeploymentAuditLog>,
}

impl FallbackScriptGenerator {
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        records: Arc<dyn DeploymentRecordStore>,
        audit: Arc<DeploymentAuditLog>,
    ) -> Self {
        Self {
            tenant_id,
            records,
            audit,
        }
    }

    /// Renders, persists and audits a script. One audit entry per call.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid spec, `Storage` if the record
    /// cannot be written.
    #[instrument(skip(self, spec), fields(tenant_id = %self.tenant_id, rule_name = %spec.name))]
    pub async fn generate(
        &self,
        spec: &RuleSpec,
        operation: ScriptOperation,
    ) -> ExchangeResult<GeneratedScript> {
        let started = Instant::now();
        let result = self.generate_inner(spec, operation).await;

        let entry = match &result {
            Ok(generated) => AuditEntry::new(
                self.tenant_id,
                DeploymentOperation::GenerateScript,
                DeploymentLogStatus::Warning,
                format!(
                    "Generated {} script for rule '{}'; manual execution required",
                    operation.as_str(),
                    spec.name
                ),
            )
            .with_details(serde_json::json!({
                "operation": operation,
                "recordStatus": generated.record_status,
            })),
            Err(e) => AuditEntry::new(
                self.tenant_id,
                DeploymentOperation::GenerateScript,
                DeploymentLogStatus::Error,
                e.to_string(),
            )
            .with_details(serde_json::json!({ "errorCode": e.error_code() })),
        };
        self.audit
            .record(entry.with_rule(spec.name.clone()).timed(started))
            .await;

        result
    }

    async fn generate_inner(
        &self,
        spec: &RuleSpec,
        operation: ScriptOperation,
    ) -> ExchangeResult<GeneratedScript> {
        if operation == ScriptOperation::Delete {
            crate::rule::validate_rule_name(&spec.name)?;
        } else {
            spec.validate()?;
        }

        let generated = render(spec, operation);
        let content_hash = match operation {
            ScriptOperation::Delete => self
                .records
                .find(self.tenant_id, &spec.name)
                .await?
                .map(|r| r.content_hash)
                .unwrap_or_default(),
            _ => spec.content_hash(),
        };
        self.persist(&spec.name, content_hash, &generated).await?;
        Ok(generated)
    }

    /// Stores a rendered script on the rule's record without auditing; the
    /// caller owns the audit entry.
    pub(crate) async fn persist(
        &self,
        rule_name: &str,
        content_hash: String,
        generated: &GeneratedScript,
    ) -> ExchangeResult<()> {
        self.records
            .upsert(UpsertDeploymentRecord {
                tenant_id: *self.tenant_id.as_uuid(),
                rule_name: rule_name.to_string(),
                remote_rule_id: None,
                status: generated.record_status,
                content_hash,
                script_text: Some(generated.script_text.clone()),
                deployed_at: Utc::now(),
            })
            .await?;

        info!(
            rule_name = %rule_name,
            status = %generated.record_status,
            "Stored script awaiting manual execution"
        );
        Ok(())
    }
}

impl std::fmt::Debug for FallbackScriptGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackScriptGenerator")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}
