//! Desired disclaimer rule and its remote wire representation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ExchangeError, ExchangeResult};

/// Longest accepted rule name, in characters.
pub const MAX_RULE_NAME_LEN: usize = 64;

/// Longest accepted disclaimer body, in characters.
pub const MAX_DISCLAIMER_LEN: usize = 5000;

fn rule_name_errors(name: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push("Rule name must not be empty".to_string());
    } else if name.chars().count() > MAX_RULE_NAME_LEN {
        errors.push(format!(
            "Rule name must be at most {MAX_RULE_NAME_LEN} characters"
        ));
    }
    if name.chars().any(char::is_control) {
        errors.push("Rule name must not contain control characters".to_string());
    }
    errors
}

/// Checks a rule name on its own, for operations that take only a name.
///
/// # Errors
///
/// Returns `ExchangeError::Validation` carrying every violated constraint.
pub fn validate_rule_name(name: &str) -> ExchangeResult<()> {
    let errors = rule_name_errors(name);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ExchangeError::Validation { errors })
    }
}

/// Where the disclaimer is inserted into the message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisclaimerLocation {
    #[default]
    Append,
    Prepend,
}

impl DisclaimerLocation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DisclaimerLocation::Append => "Append",
            DisclaimerLocation::Prepend => "Prepend",
        }
    }
}

/// What the mail system does when the disclaimer cannot be inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackAction {
    #[default]
    Wrap,
    Ignore,
    Reject,
}

impl FallbackAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackAction::Wrap => "Wrap",
            FallbackAction::Ignore => "Ignore",
            FallbackAction::Reject => "Reject",
        }
    }
}

/// Sender or recipient scope a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageScope {
    InOrganization,
    NotInOrganization,
}

impl MessageScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageScope::InOrganization => "InOrganization",
            MessageScope::NotInOrganization => "NotInOrganization",
        }
    }
}

/// Remote rule state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleState {
    Enabled,
    Disabled,
}

fn default_enabled() -> bool {
    true
}

/// Desired disclaimer rule. Immutable input to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Unique per tenant; the reconciliation key.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub from_scope: Option<MessageScope>,
    #[serde(default)]
    pub sent_to_scope: Option<MessageScope>,
    pub disclaimer_html: String,
    #[serde(default)]
    pub location: DisclaimerLocation,
    #[serde(default)]
    pub fallback_action: FallbackAction,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleSpec {
    /// A rule with default placement and scope.
    #[must_use]
    pub fn new(name: impl Into<String>, disclaimer_html: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            from_scope: None,
            sent_to_scope: None,
            disclaimer_html: disclaimer_html.into(),
            location: DisclaimerLocation::default(),
            fallback_action: FallbackAction::default(),
            priority: 0,
            enabled: true,
        }
    }

    /// Local checks performed before any network call.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Validation` carrying every violated constraint.
    pub fn validate(&self) -> ExchangeResult<()> {
        let mut errors = rule_name_errors(&self.name);

        if self.disclaimer_html.trim().is_empty() {
            errors.push("Disclaimer HTML must not be empty".to_string());
        } else if self.disclaimer_html.chars().count() > MAX_DISCLAIMER_LEN {
            errors.push(format!(
                "Disclaimer HTML must be at most {MAX_DISCLAIMER_LEN} characters"
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ExchangeError::Validation { errors })
        }
    }

    /// SHA-256 over every field that reaches the remote rule.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.name.as_str(),
            self.description.as_str(),
            self.from_scope.map_or("", |s| s.as_str()),
            self.sent_to_scope.map_or("", |s| s.as_str()),
            self.disclaimer_html.as_str(),
            self.location.as_str(),
            self.fallback_action.as_str(),
            &self.priority.to_string(),
            if self.enabled { "enabled" } else { "disabled" },
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    /// Full remote body; updates always send this whole body.
    #[must_use]
    pub fn to_remote_body(&self) -> TransportRuleBody {
        TransportRuleBody {
            name: self.name.clone(),
            comments: self.description.clone(),
            from_scope: self.from_scope,
            sent_to_scope: self.sent_to_scope,
            apply_html_disclaimer_location: self.location,
            apply_html_disclaimer_text: self.disclaimer_html.clone(),
            apply_html_disclaimer_fallback_action: self.fallback_action,
            priority: self.priority,
            state: if self.enabled {
                RuleState::Enabled
            } else {
                RuleState::Disabled
            },
        }
    }
}

/// Transport rule body sent to the management surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransportRuleBody {
    pub name: String,
    pub comments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_scope: Option<MessageScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_to_scope: Option<MessageScope>,
    pub apply_html_disclaimer_location: DisclaimerLocation,
    pub apply_html_disclaimer_text: String,
    pub apply_html_disclaimer_fallback_action: FallbackAction,
    pub priority: u32,
    pub state: RuleState,
}

/// Transport rule as listed by the management surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteTransportRule {
    #[serde(alias = "Guid", alias = "id")]
    pub id: String,
    #[serde(alias = "name")]
    pub name: String,
    #[serde(default)]
    pub apply_html_disclaimer_text: Option<String>,
}
