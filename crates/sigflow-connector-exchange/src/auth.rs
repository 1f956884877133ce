//! OAuth2 client-credentials authentication with a per-tenant token cache.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sigflow_core::TenantId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::{ExchangeConfig, ExchangeError, ExchangeResult, TenantCredential};

/// Logical permission set a token is requested for.
///
/// The two scopes are acquired and cached independently: a provider may grant
/// or revoke one without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    /// Directory reads (organization metadata).
    Directory,
    /// Transport rule management.
    MailManagement,
}

/// OAuth2 token response from the identity provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 error response from the identity provider.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Bearer token bound to one tenant and one scope.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    pub scope: TokenScope,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token; used by the exchange and by tests.
    #[must_use]
    pub fn new(value: impl Into<String>, scope: TokenScope, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            scope,
            expires_at,
        }
    }

    /// The raw bearer value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// A token is usable only while `now < expires_at - safety_margin`.
    #[must_use]
    pub fn is_usable(&self, safety_margin: Duration) -> bool {
        Utc::now() < self.expires_at - safety_margin
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    /// Issuing directory; a tenant moved to another directory invalidates it.
    directory_tenant_id: String,
    /// Client the token was issued to; a rotated client id invalidates it.
    client_id: String,
    token: AccessToken,
}

impl CachedToken {
    fn issued_for(&self, credential: &TenantCredential) -> bool {
        self.directory_tenant_id == credential.directory_tenant_id
            && self.client_id == credential.client_id
    }
}

/// Long-lived token manager shared by every tenant connector.
///
/// Tokens are cached under `(TenantId, TokenScope)` and refreshed lazily on
/// the next use once they enter the safety margin.
#[derive(Debug)]
pub struct TokenManager {
    config: Arc<ExchangeConfig>,
    http_client: reqwest::Client,
    cache: RwLock<HashMap<(TenantId, TokenScope), CachedToken>>,
    safety_margin: Duration,
}

impl TokenManager {
    /// Creates a token manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: Arc<ExchangeConfig>) -> ExchangeResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExchangeError::Config(format!("Failed to create HTTP client: {e}")))?;

        let safety_margin = Duration::from_std(config.token_safety_margin)
            .map_err(|e| ExchangeError::Config(format!("Invalid token safety margin: {e}")))?;

        Ok(Self {
            config,
            http_client,
            cache: RwLock::new(HashMap::new()),
            safety_margin,
        })
    }

    /// Gets a valid access token for the tenant, exchanging credentials if
    /// nothing usable is cached.
    ///
    /// # Errors
    ///
    /// Returns `Authentication` when the identity provider rejects the
    /// exchange, `Network`/`Timeout` when it cannot be reached.
    #[instrument(skip(self, credential), fields(tenant_id = %credential.tenant_id))]
    pub async fn get_token(
        &self,
        credential: &TenantCredential,
        scope: TokenScope,
    ) -> ExchangeResult<AccessToken> {
        let key = (credential.tenant_id, scope);

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.issued_for(credential) && cached.token.is_usable(self.safety_margin) {
                    debug!("Using cached token");
                    return Ok(cached.token.clone());
                }
            }
        }

        debug!("Acquiring access token");
        let token = self.acquire_token(credential, scope).await?;

        {
            let mut cache = self.cache.write().await;
            cache.insert(
                key,
                CachedToken {
                    directory_tenant_id: credential.directory_tenant_id.clone(),
                    client_id: credential.client_id.clone(),
                    token: token.clone(),
                },
            );
        }

        Ok(token)
    }

    /// Performs the client-credentials exchange.
    async fn acquire_token(
        &self,
        credential: &TenantCredential,
        scope: TokenScope,
    ) -> ExchangeResult<AccessToken> {
        let token_url = self.config.token_url(&credential.directory_tenant_id);

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.expose_secret()),
            ("scope", self.config.scope_for(scope)),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExchangeError::Timeout {
                        timeout_secs: self.config.request_timeout.as_secs(),
                    }
                } else {
                    ExchangeError::Network(format!("Token endpoint unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token request rejected");

            if status.is_server_error() {
                return Err(ExchangeError::Network(format!(
                    "Token endpoint returned {status}"
                )));
            }

            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(ExchangeError::Authentication(format!(
                "Token request failed with status {status}: {detail}"
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            ExchangeError::Authentication(format!("Failed to parse token response: {e}"))
        })?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);

        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(AccessToken::new(
            token_response.access_token,
            scope,
            expires_at,
        ))
    }

    /// Drops every cached token of a tenant, forcing an exchange on next use.
    pub async fn invalidate(&self, tenant_id: TenantId) {
        let mut cache = self.cache.write().await;
        cache.retain(|(tenant, _), _| *tenant != tenant_id);
    }

    /// True if a usable token is cached for the tenant and scope.
    pub async fn has_usable_token(&self, tenant_id: TenantId, scope: TokenScope) -> bool {
        let cache = self.cache.read().await;
        cache
            .get(&(tenant_id, scope))
            .is_some_and(|cached| cached.token.is_usable(self.safety_margin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usable_outside_margin() {
        let token = AccessToken::new(
            "test",
            TokenScope::Directory,
            Utc::now() + Duration::minutes(10),
        );

        assert!(token.is_usable(Duration::minutes(5)));
        assert!(!token.is_usable(Duration::minutes(15)));
    }

    #[test]
    fn test_expired_token_is_not_usable() {
        let token = AccessToken::new(
            "test",
            TokenScope::MailManagement,
            Utc::now() - Duration::minutes(1),
        );

        assert!(!token.is_usable(Duration::zero()));
    }

    #[test]
    fn test_token_debug_redacts_value() {
        let token = AccessToken::new(
            "eyJ0eXAi.secret",
            TokenScope::Directory,
            Utc::now(),
        );
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("eyJ0eXAi"));
    }

    #[test]
    fn test_error_response_parsing() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided."}"#;
        let err: TokenErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(err.error, "invalid_client");
        assert!(err.error_description.unwrap().contains("AADSTS7000215"));
    }
}
