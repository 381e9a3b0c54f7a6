//! Rotator configuration file model.
//!
//! Built once at process start (file, then environment/flag overrides) and
//! passed by reference to everything that needs it.

use crate::constants;
use anyhow::{bail, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotatorConfig {
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub directory: DirectorySection,
    #[serde(default)]
    pub rotation: RotationSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub state: StateSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSection {
    /// Key Vault URI, e.g. `https://my-vault.vault.azure.net`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySection {
    #[serde(default = "default_graph_endpoint")]
    pub graph_endpoint: String,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            graph_endpoint: default_graph_endpoint(),
        }
    }
}

/// How new credentials are issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSection {
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
            display_name: default_display_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    ManagedIdentity,
    ClientSecret,
    StaticToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub method: AuthMethod,
    /// Managed identity (user-assigned) or app registration client id.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Pre-issued bearer token, for local runs.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default = "default_imds_endpoint")]
    pub imds_endpoint: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            method: AuthMethod::default(),
            client_id: None,
            tenant_id: None,
            client_secret_file: None,
            token_file: None,
            authority: default_authority(),
            imds_endpoint: default_imds_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSection {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
    /// Record every outcome in the audit trail.
    #[serde(default = "default_true")]
    pub audit: bool,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            audit: true,
        }
    }
}

/// Values supplied by flags or environment; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub vault_endpoint: Option<String>,
    pub validity_days: Option<u32>,
    pub client_id: Option<String>,
    pub state_dir: Option<PathBuf>,
}

impl RotatorConfig {
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(endpoint) = overrides.vault_endpoint {
            self.vault.endpoint = Some(endpoint);
        }
        if let Some(days) = overrides.validity_days {
            self.rotation.validity_days = days;
        }
        if let Some(client_id) = overrides.client_id {
            self.auth.client_id = Some(client_id);
        }
        if let Some(dir) = overrides.state_dir {
            self.state.dir = dir;
        }
    }

    /// Configured vault endpoint, if non-blank.
    pub fn vault_endpoint(&self) -> Option<&str> {
        self.vault
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Everything wrong with this configuration. The vault endpoint is not
    /// checked for presence here: its absence aborts each invocation instead.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(endpoint) = self.vault_endpoint() {
            if let Err(e) = parse_http_url(endpoint) {
                out.push(format!("vault.endpoint: {}", e));
            }
        }
        if let Err(e) = parse_http_url(&self.directory.graph_endpoint) {
            out.push(format!("directory.graph_endpoint: {}", e));
        }

        let days = self.rotation.validity_days;
        if days == 0 || days > constants::MAX_VALIDITY_DAYS {
            out.push(format!(
                "rotation.validity_days: {} outside 1..={}",
                days,
                constants::MAX_VALIDITY_DAYS
            ));
        }
        if self.rotation.display_name.trim().is_empty() {
            out.push("rotation.display_name: must not be empty".to_string());
        }

        match self.auth.method {
            AuthMethod::ManagedIdentity => {}
            AuthMethod::ClientSecret => {
                if self.auth.tenant_id.is_none() {
                    out.push("auth.tenant_id: required for client_secret".to_string());
                }
                if self.auth.client_id.is_none() {
                    out.push("auth.client_id: required for client_secret".to_string());
                }
                if self.auth.client_secret_file.is_none() {
                    out.push("auth.client_secret_file: required for client_secret".to_string());
                }
            }
            AuthMethod::StaticToken => {
                if self.auth.token_file.is_none() {
                    out.push("auth.token_file: required for static_token".to_string());
                }
            }
        }

        if self.http.request_timeout_secs == 0 {
            out.push("http.request_timeout_secs: must be positive".to_string());
        }
        if self.http.max_retries > constants::MAX_HTTP_RETRIES {
            out.push(format!(
                "http.max_retries: at most {}",
                constants::MAX_HTTP_RETRIES
            ));
        }

        out
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if !problems.is_empty() {
            bail!("invalid configuration: {}", problems.join("; "));
        }
        Ok(())
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    if url.scheme() != "https" && url.scheme() != "http" {
        bail!("unsupported scheme '{}'", url.scheme());
    }
    Ok(url)
}

fn default_graph_endpoint() -> String {
    constants::DEFAULT_GRAPH_ENDPOINT.to_string()
}

fn default_validity_days() -> u32 {
    constants::DEFAULT_VALIDITY_DAYS
}

fn default_display_name() -> String {
    constants::DEFAULT_CREDENTIAL_DISPLAY_NAME.to_string()
}

fn default_authority() -> String {
    constants::DEFAULT_AUTHORITY.to_string()
}

fn default_imds_endpoint() -> String {
    constants::DEFAULT_IMDS_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    constants::DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    constants::DEFAULT_MAX_RETRIES
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(constants::DEFAULT_STATE_DIR)
}

fn default_true() -> bool {
    true
}
