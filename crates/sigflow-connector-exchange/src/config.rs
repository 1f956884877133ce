//! Connector configuration and tenant credentials.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sigflow_core::{TenantAware, TenantId};
use sigflow_db::TenantConnectorSettings;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::TokenScope;
use crate::{ExchangeError, ExchangeResult};

/// Placeholder substituted with the directory tenant id in configured URLs.
pub const TENANT_PLACEHOLDER: &str = "{tenant_id}";

/// Sovereign cloud the tenant lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeCloudEnvironment {
    #[default]
    Commercial,
    UsGovernment,
    China,
}

impl ExchangeCloudEnvironment {
    /// Identity provider authority.
    #[must_use]
    pub fn login_endpoint(&self) -> &'static str {
        match self {
            ExchangeCloudEnvironment::Commercial => "https://login.microsoftonline.com",
            ExchangeCloudEnvironment::UsGovernment => "https://login.microsoftonline.us",
            ExchangeCloudEnvironment::China => "https://login.chinacloudapi.cn",
        }
    }

    /// Directory (organization metadata) API host.
    #[must_use]
    pub fn directory_endpoint(&self) -> &'static str {
        match self {
            ExchangeCloudEnvironment::Commercial => "https://graph.microsoft.com",
            ExchangeCloudEnvironment::UsGovernment => "https://graph.microsoft.us",
            ExchangeCloudEnvironment::China => "https://microsoftgraph.chinacloudapi.cn",
        }
    }

    /// Mail management API host.
    #[must_use]
    pub fn management_endpoint(&self) -> &'static str {
        match self {
            ExchangeCloudEnvironment::Commercial => "https://outlook.office365.com",
            ExchangeCloudEnvironment::UsGovernment => "https://outlook.office365.us",
            ExchangeCloudEnvironment::China => "https://partner.outlook.cn",
        }
    }
}

impl FromStr for ExchangeCloudEnvironment {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "commercial" | "global" => Ok(ExchangeCloudEnvironment::Commercial),
            "us_government" | "usgov" | "gcc_high" => Ok(ExchangeCloudEnvironment::UsGovernment),
            "china" => Ok(ExchangeCloudEnvironment::China),
            other => Err(ExchangeError::Config(format!(
                "unknown cloud environment '{other}'"
            ))),
        }
    }
}

/// How the reconciler mutates remote rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMutationMode {
    /// Call the management surface; fall back to a script when it reports the
    /// operation as unsupported.
    #[default]
    Detect,
    /// Never call the mutation endpoints; always produce a script.
    ScriptOnly,
}

impl FromStr for RuleMutationMode {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detect" | "auto" => Ok(RuleMutationMode::Detect),
            "script_only" | "script" => Ok(RuleMutationMode::ScriptOnly),
            other => Err(ExchangeError::Config(format!(
                "unknown mutation mode '{other}'"
            ))),
        }
    }
}

/// Connector configuration shared by every tenant.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub cloud: ExchangeCloudEnvironment,
    pub login_endpoint: String,
    /// Base URL of the directory API; may contain `{tenant_id}`.
    pub directory_base_url: String,
    /// Base URL of the mail management API; may contain `{tenant_id}`.
    pub management_base_url: String,
    pub organization_path: String,
    pub transport_rules_path: String,
    pub directory_scope: String,
    pub management_scope: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Deadline applied around each connector operation.
    pub operation_timeout: Duration,
    /// Tokens are refreshed this long before they expire.
    pub token_safety_margin: Duration,
    pub mutation_mode: RuleMutationMode,
}

impl ExchangeConfig {
    /// Creates a builder seeded with the commercial cloud defaults.
    #[must_use]
    pub fn builder() -> ExchangeConfigBuilder {
        ExchangeConfigBuilder::default()
    }

    /// Token endpoint of a directory tenant.
    #[must_use]
    pub fn token_url(&self, directory_tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_endpoint.trim_end_matches('/'),
            directory_tenant_id
        )
    }

    /// Organization metadata resource used by the connection probe.
    #[must_use]
    pub fn organization_url(&self, directory_tenant_id: &str) -> String {
        join_url(
            &self.directory_base_url,
            &self.organization_path,
            directory_tenant_id,
        )
    }

    /// Transport rule collection.
    #[must_use]
    pub fn transport_rules_url(&self, directory_tenant_id: &str) -> String {
        join_url(
            &self.management_base_url,
            &self.transport_rules_path,
            directory_tenant_id,
        )
    }

    /// A single transport rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured management URL cannot be parsed.
    pub fn transport_rule_url(
        &self,
        directory_tenant_id: &str,
        rule_id: &str,
    ) -> ExchangeResult<String> {
        let mut url = url::Url::parse(&self.transport_rules_url(directory_tenant_id))?;
        url.path_segments_mut()
            .map_err(|()| {
                ExchangeError::Config("management base URL cannot carry a path".to_string())
            })?
            .push(rule_id);
        Ok(url.into())
    }

    /// Scope string requested for a logical token scope.
    #[must_use]
    pub fn scope_for(&self, scope: TokenScope) -> &str {
        match scope {
            TokenScope::Directory => &self.directory_scope,
            TokenScope::MailManagement => &self.management_scope,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfigBuilder::default().defaults()
    }
}

fn join_url(base: &str, path: &str, directory_tenant_id: &str) -> String {
    let base = base.replace(TENANT_PLACEHOLDER, directory_tenant_id);
    let path = path.replace(TENANT_PLACEHOLDER, directory_tenant_id);
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Builder for [`ExchangeConfig`].
#[derive(Debug, Clone, Default)]
pub struct ExchangeConfigBuilder {
    cloud: ExchangeCloudEnvironment,
    login_endpoint: Option<String>,
    directory_base_url: Option<String>,
    management_base_url: Option<String>,
    organization_path: Option<String>,
    transport_rules_path: Option<String>,
    directory_scope: Option<String>,
    management_scope: Option<String>,
    request_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    token_safety_margin: Option<Duration>,
    mutation_mode: RuleMutationMode,
}

impl ExchangeConfigBuilder {
    #[must_use]
    pub fn cloud(mut self, cloud: ExchangeCloudEnvironment) -> Self {
        self.cloud = cloud;
        self
    }

    #[must_use]
    pub fn login_endpoint(mut self, url: impl Into<String>) -> Self {
        self.login_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn directory_base_url(mut self, url: impl Into<String>) -> Self {
        self.directory_base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn management_base_url(mut self, url: impl Into<String>) -> Self {
        self.management_base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn organization_path(mut self, path: impl Into<String>) -> Self {
        self.organization_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn transport_rules_path(mut self, path: impl Into<String>) -> Self {
        self.transport_rules_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn directory_scope(mut self, scope: impl Into<String>) -> Self {
        self.directory_scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn management_scope(mut self, scope: impl Into<String>) -> Self {
        self.management_scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn token_safety_margin(mut self, margin: Duration) -> Self {
        self.token_safety_margin = Some(margin);
        self
    }

    #[must_use]
    pub fn mutation_mode(mut self, mode: RuleMutationMode) -> Self {
        self.mutation_mode = mode;
        self
    }

    fn defaults(self) -> ExchangeConfig {
        let cloud = self.cloud;
        ExchangeConfig {
            cloud,
            login_endpoint: self
                .login_endpoint
                .unwrap_or_else(|| cloud.login_endpoint().to_string()),
            directory_base_url: self
                .directory_base_url
                .unwrap_or_else(|| format!("{}/v1.0", cloud.directory_endpoint())),
            management_base_url: self.management_base_url.unwrap_or_else(|| {
                format!(
                    "{}/adminapi/beta/{}",
                    cloud.management_endpoint(),
                    TENANT_PLACEHOLDER
                )
            }),
            organization_path: self
                .organization_path
                .unwrap_or_else(|| "/organization".to_string()),
            transport_rules_path: self
                .transport_rules_path
                .unwrap_or_else(|| "/TransportRule".to_string()),
            directory_scope: self
                .directory_scope
                .unwrap_or_else(|| format!("{}/.default", cloud.directory_endpoint())),
            management_scope: self
                .management_scope
                .unwrap_or_else(|| format!("{}/.default", cloud.management_endpoint())),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            operation_timeout: self.operation_timeout.unwrap_or(Duration::from_secs(30)),
            token_safety_margin: self
                .token_safety_margin
                .unwrap_or(Duration::from_secs(5 * 60)),
            mutation_mode: self.mutation_mode,
        }
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Config` for unparseable URLs, relative paths
    /// without a leading `/`, or zero timeouts.
    pub fn build(self) -> ExchangeResult<ExchangeConfig> {
        let config = self.defaults();

        for (label, value) in [
            ("login_endpoint", &config.login_endpoint),
            ("directory_base_url", &config.directory_base_url),
            ("management_base_url", &config.management_base_url),
        ] {
            let probe = value.replace(TENANT_PLACEHOLDER, "tenant");
            url::Url::parse(&probe)
                .map_err(|e| ExchangeError::Config(format!("invalid {label} '{value}': {e}")))?;
        }

        for (label, value) in [
            ("organization_path", &config.organization_path),
            ("transport_rules_path", &config.transport_rules_path),
        ] {
            if !value.starts_with('/') {
                return Err(ExchangeError::Config(format!(
                    "{label} must start with '/': {value}"
                )));
            }
        }

        if config.request_timeout.is_zero() || config.operation_timeout.is_zero() {
            return Err(ExchangeError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if chrono::Duration::from_std(config.token_safety_margin).is_err() {
            return Err(ExchangeError::Config(
                "token safety margin is out of range".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Directory credentials of one tenant.
///
/// The client secret is write-only: it is never rendered by `Debug` and is
/// only shown masked.
pub struct TenantCredential {
    pub tenant_id: TenantId,
    /// Tenant id at the identity provider (GUID or verified domain).
    pub directory_tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub connection_enabled: bool,
}

impl TenantCredential {
    /// Builds a credential from stored connector settings.
    #[must_use]
    pub fn from_settings(settings: &TenantConnectorSettings) -> Self {
        Self {
            tenant_id: TenantId::from_uuid(settings.tenant_id),
            directory_tenant_id: settings.directory_tenant_id.clone(),
            client_id: settings.client_id.clone(),
            client_secret: SecretString::from(settings.client_secret.clone()),
            connection_enabled: settings.connection_enabled,
        }
    }

    /// Masked rendering of the client secret for redisplay.
    #[must_use]
    pub fn masked_client_secret(&self) -> String {
        if self.client_secret.expose_secret().is_empty() {
            String::new()
        } else {
            "********".to_string()
        }
    }

    /// Checks that the credential can be used for a token exchange.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Config` listing every missing or malformed field.
    pub fn validate(&self) -> ExchangeResult<()> {
        let mut problems = Vec::new();

        if self.directory_tenant_id.trim().is_empty() {
            problems.push("directory tenant id is required");
        } else if !self
            .directory_tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            problems.push("directory tenant id contains invalid characters");
        }
        if self.client_id.trim().is_empty() {
            problems.push("client id is required");
        }
        if self.client_secret.expose_secret().is_empty() {
            problems.push("client secret is required");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ExchangeError::Config(problems.join("; ")))
        }
    }

    /// Applies an explicit settings update. An absent secret keeps the
    /// current one.
    #[must_use]
    pub fn apply(self, update: TenantCredentialUpdate) -> Self {
        Self {
            tenant_id: self.tenant_id,
            directory_tenant_id: update
                .directory_tenant_id
                .unwrap_or(self.directory_tenant_id),
            client_id: update.client_id.unwrap_or(self.client_id),
            client_secret: update.client_secret.unwrap_or(self.client_secret),
            connection_enabled: update
                .connection_enabled
                .unwrap_or(self.connection_enabled),
        }
    }
}

impl TenantAware for TenantCredential {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl std::fmt::Debug for TenantCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCredential")
            .field("tenant_id", &self.tenant_id)
            .field("directory_tenant_id", &self.directory_tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.masked_client_secret())
            .field("connection_enabled", &self.connection_enabled)
            .finish()
    }
}

/// Explicit update of a tenant's connector settings.
#[derive(Default)]
pub struct TenantCredentialUpdate {
    pub directory_tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub connection_enabled: Option<bool>,
}
