//! Bearer tokens for Graph and Key Vault.
//!
//! Three sources: a pre-issued token read from a file, the client-credentials
//! grant, and managed identity through the instance metadata endpoint.
//! Fetched tokens are cached per scope until shortly before they expire.

use crate::constants;
use crate::models::config::{AuthMethod, AuthSection};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Request(String),
    #[error("token endpoint rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Bearer token valid for `scope` (e.g. `https://vault.azure.net/.default`).
    async fn token(&self, scope: &str) -> Result<Zeroizing<String>, TokenError>;
}

/// Build the token source selected in the configuration.
pub fn from_config(auth: &AuthSection, http: Client) -> Result<Arc<dyn TokenSource>> {
    let source: Arc<dyn TokenSource> = match auth.method {
        AuthMethod::StaticToken => {
            let path = auth
                .token_file
                .as_deref()
                .context("auth.token_file is required for static_token")?;
            Arc::new(StaticToken::from_file(path)?)
        }
        AuthMethod::ClientSecret => {
            let tenant = auth
                .tenant_id
                .as_deref()
                .context("auth.tenant_id is required for client_secret")?;
            let client_id = auth
                .client_id
                .as_deref()
                .context("auth.client_id is required for client_secret")?;
            let secret_file = auth
                .client_secret_file
                .as_deref()
                .context("auth.client_secret_file is required for client_secret")?;
            let secret = read_trimmed(secret_file)?;
            Arc::new(ClientSecretCredential::new(
                http,
                &auth.authority,
                tenant,
                client_id,
                secret,
            ))
        }
        AuthMethod::ManagedIdentity => Arc::new(ManagedIdentityCredential::new(
            http,
            &auth.imds_endpoint,
            auth.client_id.clone(),
        )),
    };
    Ok(source)
}

fn read_trimmed(path: &Path) -> Result<Zeroizing<String>> {
    let content = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("read credential file {}", path.display()))?,
    );
    let trimmed = content.trim();
    if trimmed.is_empty() {
        anyhow::bail!("credential file {} is empty", path.display());
    }
    debug!(path = %path.display(), "loaded credential file");
    Ok(Zeroizing::new(trimmed.to_string()))
}

/// A token issued out of band. Used for every scope.
pub struct StaticToken {
    token: Zeroizing<String>,
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: Zeroizing::new(token.to_string()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self {
            token: read_trimmed(path)?,
        })
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self, _scope: &str) -> Result<Zeroizing<String>, TokenError> {
        Ok(self.token.clone())
    }
}

struct CachedToken {
    value: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(constants::TOKEN_REFRESH_SKEW_SECS) > now
    }
}

#[derive(Default)]
struct TokenCache {
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    async fn get(&self, scope: &str) -> Option<Zeroizing<String>> {
        let entries = self.entries.read().await;
        entries
            .get(scope)
            .filter(|t| t.is_valid(Utc::now()))
            .map(|t| t.value.clone())
    }

    async fn put(&self, scope: &str, token: &TokenResponse) -> Result<Zeroizing<String>, TokenError> {
        let expires_in = token.expires_in_secs()?;
        let value = Zeroizing::new(token.access_token.clone());
        self.entries.write().await.insert(
            scope.to_string(),
            CachedToken {
                value: value.clone(),
                expires_at: Utc::now() + Duration::seconds(expires_in),
            },
        );
        debug!(scope, expires_in_secs = expires_in, "cached access token");
        Ok(value)
    }
}

/// Token endpoint response. IMDS sends `expires_in` as a string, AAD as a
/// number.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn expires_in_secs(&self) -> Result<i64, TokenError> {
        let secs = match &self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        secs.filter(|s| *s > 0)
            .ok_or_else(|| TokenError::InvalidResponse("missing or invalid expires_in".into()))
    }
}

async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse, TokenError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(TokenError::Rejected {
            status: status.as_u16(),
            message: crate::azure::http::error_message(&text),
        });
    }
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| TokenError::InvalidResponse(e.to_string()))
}

/// OAuth2 client-credentials grant against Azure AD.
pub struct ClientSecretCredential {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: Zeroizing<String>,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        http: Client,
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: Zeroizing<String>,
    ) -> Self {
        Self {
            http,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                authority.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.to_string(),
            client_secret,
            cache: TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenSource for ClientSecretCredential {
    async fn token(&self, scope: &str) -> Result<Zeroizing<String>, TokenError> {
        if let Some(token) = self.cache.get(scope).await {
            return Ok(token);
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        let token = read_token_response(response).await?;
        self.cache.put(scope, &token).await
    }
}

/// Managed identity via the instance metadata service.
pub struct ManagedIdentityCredential {
    http: Client,
    endpoint: String,
    client_id: Option<String>,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new(http: Client, endpoint: &str, client_id: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            client_id,
            cache: TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityCredential {
    async fn token(&self, scope: &str) -> Result<Zeroizing<String>, TokenError> {
        if let Some(token) = self.cache.get(scope).await {
            return Ok(token);
        }

        // IMDS takes a resource, not a v2 scope
        let resource = scope.trim_end_matches("/.default");
        let mut query = vec![("api-version", "2018-02-01"), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        let token = read_token_response(response).await?;
        self.cache.put(scope, &token).await
    }
}
