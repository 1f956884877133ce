//! Authenticated HTTP client for the directory and mail management surfaces.
//!
//! Requests are fail-fast: there is no retry or backoff. Every error response
//! is mapped onto the connector taxonomy so callers branch on variants, never
//! on message text.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::auth::{TokenManager, TokenScope};
use crate::{ExchangeConfig, ExchangeError, ExchangeResult, TenantCredential};

/// Error codes the management surface uses to say "not available here".
const UNSUPPORTED_CODES: &[&str] = &[
    "notsupported",
    "unsupportedoperation",
    "notimplemented",
    "operationnotsupported",
];

/// `OData` error response.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// Response wrapper for paginated collection responses.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// HTTP client bound to exactly one tenant's credential.
#[derive(Debug)]
pub struct ManagementClient {
    config: Arc<ExchangeConfig>,
    tokens: Arc<TokenManager>,
    credential: Arc<TenantCredential>,
    http_client: reqwest::Client,
}

impl ManagementClient {
    /// Creates a client for one tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        config: Arc<ExchangeConfig>,
        tokens: Arc<TokenManager>,
        credential: Arc<TenantCredential>,
    ) -> ExchangeResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExchangeError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            tokens,
            credential,
            http_client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    #[must_use]
    pub fn credential(&self) -> &TenantCredential {
        &self.credential
    }

    /// Obtains a token for this client's tenant.
    ///
    /// # Errors
    ///
    /// Propagates token exchange failures.
    pub async fn token(&self, scope: TokenScope) -> ExchangeResult<crate::AccessToken> {
        self.tokens.get_token(&self.credential, scope).await
    }

    /// Performs a GET request.
    #[instrument(skip(self), fields(tenant_id = %self.credential.tenant_id))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        scope: TokenScope,
        url: &str,
    ) -> ExchangeResult<T> {
        let response = self
            .send(reqwest::Method::GET, scope, url, None::<&()>)
            .await?;
        self.read_json(response).await
    }

    /// Fetches every page of a collection, following `@odata.nextLink`.
    #[instrument(skip(self), fields(tenant_id = %self.credential.tenant_id))]
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        scope: TokenScope,
        url: &str,
    ) -> ExchangeResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next {
            debug!("Fetching page: {}", page_url);
            let page: ODataResponse<T> = self.get(scope, &page_url).await?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }

    /// Performs a POST request and decodes the created resource.
    #[instrument(skip(self, body), fields(tenant_id = %self.credential.tenant_id))]
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        scope: TokenScope,
        url: &str,
        body: &B,
    ) -> ExchangeResult<T> {
        let response = self
            .send(reqwest::Method::POST, scope, url, Some(body))
            .await?;
        self.read_json(response).await
    }

    /// Performs a PUT request carrying the full resource body.
    #[instrument(skip(self, body), fields(tenant_id = %self.credential.tenant_id))]
    pub async fn put<B: Serialize>(
        &self,
        scope: TokenScope,
        url: &str,
        body: &B,
    ) -> ExchangeResult<()> {
        self.send(reqwest::Method::PUT, scope, url, Some(body))
            .await?;
        Ok(())
    }

    /// Performs a DELETE request.
    #[instrument(skip(self), fields(tenant_id = %self.credential.tenant_id))]
    pub async fn delete(&self, scope: TokenScope, url: &str) -> ExchangeResult<()> {
        self.send(reqwest::Method::DELETE, scope, url, None::<&()>)
            .await?;
        Ok(())
    }

    /// Decodes a success body; a body that arrives but does not parse is a
    /// `Json` error, not a connectivity failure.
    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout {
                    timeout_secs: self.config.request_timeout.as_secs(),
                }
            } else {
                ExchangeError::Network(format!("Failed to read response body: {e}"))
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send<B: Serialize>(
        &self,
        method: reqwest::Method,
        scope: TokenScope,
        url: &str,
        body: Option<&B>,
    ) -> ExchangeResult<reqwest::Response> {
        let token = self.token(scope).await?;

        let mut request = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(token.value());

        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout {
                    timeout_secs: self.config.request_timeout.as_secs(),
                }
            } else {
                ExchangeError::Network(format!("{method} {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        let error = classify_error(method.as_str(), status, &error_body);
        warn!(status = %status, code = error.error_code(), "Remote call failed");
        Err(error)
    }
}

/// Maps an error response onto the connector taxonomy.
pub(crate) fn classify_error(method: &str, status: StatusCode, body: &str) -> ExchangeError {
    let (code, message) = match serde_json::from_str::<ODataError>(body) {
        Ok(odata) => (odata.error.code, odata.error.message),
        Err(_) => (status.to_string(), body.to_string()),
    };

    let unsupported_code = UNSUPPORTED_CODES
        .iter()
        .any(|c| code.eq_ignore_ascii_case(c));

    if unsupported_code
        || matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        )
    {
        return ExchangeError::UnsupportedOperation {
            operation: method.to_string(),
            message: if message.is_empty() { code } else { message },
        };
    }

    match status {
        StatusCode::UNAUTHORIZED => ExchangeError::Authentication(format!(
            "Remote surface rejected the access token: {message}"
        )),
        StatusCode::FORBIDDEN => ExchangeError::Authorization(format!(
            "Insufficient permissions for {method}: {message}"
        )),
        s if s.is_server_error() => ExchangeError::Network(format!("HTTP {s}: {message}")),
        s => ExchangeError::RemoteApi {
            status: s.as_u16(),
            code,
            message,
        },
    }
}
