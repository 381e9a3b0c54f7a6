//! Azure REST adapters: token acquisition, Key Vault and Microsoft Graph.

pub mod graph;
pub mod http;
pub mod key_vault;
pub mod token;

use crate::constants;
use crate::core::directory::Directory;
use crate::core::secret_store::SecretStore;
use crate::models::config::RotatorConfig;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Live adapters built from the configuration. `store` is absent when no
/// vault endpoint is configured.
pub struct AzureAdapters {
    pub store: Option<Arc<dyn SecretStore>>,
    pub directory: Arc<dyn Directory>,
    pub tokens: Arc<dyn token::TokenSource>,
}

impl AzureAdapters {
    pub fn from_config(config: &RotatorConfig) -> Result<Self> {
        let http = http::build_client(&config.http)?;
        let tokens = token::from_config(&config.auth, http.clone())?;

        let store = match config.vault_endpoint() {
            Some(endpoint) => {
                let vault_api = http::ApiClient::new(
                    http.clone(),
                    endpoint,
                    tokens.clone(),
                    constants::KEY_VAULT_SCOPE,
                    config.http.max_retries,
                )
                .context("vault.endpoint")?;
                Some(Arc::new(key_vault::KeyVaultStore::new(vault_api)) as Arc<dyn SecretStore>)
            }
            None => None,
        };
        let graph_api = http::ApiClient::new(
            http,
            &config.directory.graph_endpoint,
            tokens.clone(),
            constants::GRAPH_SCOPE,
            config.http.max_retries,
        )
        .context("directory.graph_endpoint")?;

        Ok(Self {
            store,
            directory: Arc::new(graph::GraphDirectory::new(graph_api)),
            tokens,
        })
    }
}
