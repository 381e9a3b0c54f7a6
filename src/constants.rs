//! Centralized constants for defaults, permissions, and service endpoints.

/// Default state directory (locks and audit trail).
pub const DEFAULT_STATE_DIR: &str = "/var/lib/appreg-rotator";

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rotator.toml";

/// Validity window, in days, for newly issued password credentials.
pub const DEFAULT_VALIDITY_DAYS: u32 = 30;

/// Upper bound accepted for the validity window.
pub const MAX_VALIDITY_DAYS: u32 = 730;

/// Display name attached to credentials issued by the rotator.
pub const DEFAULT_CREDENTIAL_DISPLAY_NAME: &str = "Set via automation";

/// Microsoft Graph base URL.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

/// OAuth scope for Microsoft Graph.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// OAuth scope for Azure Key Vault.
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Key Vault REST API version.
pub const KEY_VAULT_API_VERSION: &str = "7.4";

/// Azure AD authority host for the client-credentials grant.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Instance metadata endpoint for managed identity tokens.
pub const DEFAULT_IMDS_ENDPOINT: &str =
    "http://169.254.169.254/metadata/identity/oauth2/token";

/// Per-request HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retries for idempotent reads after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound for `http.max_retries`.
pub const MAX_HTTP_RETRIES: u32 = 10;

/// Tokens are refreshed this many seconds before they expire.
pub const TOKEN_REFRESH_SKEW_SECS: i64 = 60;

/// Longest key id accepted from the store's content-type field.
pub const MAX_KEY_ID_LEN: usize = 128;

/// Permission mode for the state directory.
pub const STATE_DIR_MODE: u32 = 0o700;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// Permission mode for rotator.toml.
pub const CONFIG_FILE_MODE: u32 = 0o640;
