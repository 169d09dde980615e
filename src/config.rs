//! Configuration management for the Tenzir Platform CLI
//!
//! All settings are read from environment variables prefixed with
//! `TENZIR_PLATFORM_CLI_`, for example
//!
//! ```text
//! TENZIR_PLATFORM_CLI_API_ENDPOINT=https://tenzir.example
//! ```
//!
//! There are no command-line flags for these values. The configuration is
//! constructed once at process start and passed explicitly to every component.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{PlatformError, Result};

/// Prefix shared by all configuration environment variables
pub const ENV_PREFIX: &str = "TENZIR_PLATFORM_CLI_";

/// Default remote API endpoint of the platform
pub const DEFAULT_API_ENDPOINT: &str = "https://rest.tenzir.app/production-v1";

/// Default OIDC issuer
pub const DEFAULT_ISSUER_URL: &str = "https://tenzir.eu.auth0.com/";

/// Default OIDC client id of the CLI application
pub const DEFAULT_CLIENT_ID: &str = "vzRh8grIVu1bwutvZbbpBDCOvSzN8AXh";

/// Default delay between connection retries of the request client
pub const DEFAULT_CONNECTION_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Environment-derived configuration of the CLI
///
/// # Examples
///
/// ```
/// use tenzir_platform::config::PlatformEnvironment;
///
/// let env = PlatformEnvironment::from_lookup(|key| match key {
///     "TENZIR_PLATFORM_CLI_CLIENT_ID" => Some("my-client".to_string()),
///     _ => None,
/// })
/// .unwrap();
///
/// assert_eq!(env.client_id, "my-client");
/// assert_eq!(env.audience(), "my-client");
/// ```
#[derive(Debug, Clone)]
pub struct PlatformEnvironment {
    /// The remote API endpoint of the platform.
    pub api_endpoint: String,

    /// Short string identifying this environment in the local cache directory.
    pub stage_identifier: String,

    /// OIDC issuer URL.
    pub issuer_url: String,

    /// OIDC client id.
    pub client_id: String,

    /// If provided, skips the login workflow completely.
    pub id_token: Option<String>,

    /// Client secret for non-interactive logins.
    pub client_secret: Option<String>,

    /// Path to a file holding the client secret.
    pub client_secret_file: Option<PathBuf>,

    /// Overrides the expected OIDC audience.
    pub audience: Option<String>,

    /// Overrides the default OIDC scopes.
    pub scope: Option<String>,

    /// Additional headers sent with every platform API request.
    pub extra_headers: HashMap<String, String>,

    /// Enables more verbose output.
    pub verbose: bool,

    /// Fixed delay between connection retries.
    pub connection_retry_delay: Duration,

    /// Optional client-side timeout for HTTP requests; unset means no timeout.
    pub http_timeout: Option<Duration>,
}

impl Default for PlatformEnvironment {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            stage_identifier: "prod".to_string(),
            issuer_url: DEFAULT_ISSUER_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            id_token: None,
            client_secret: None,
            client_secret_file: None,
            audience: None,
            scope: None,
            extra_headers: HashMap::new(),
            verbose: false,
            connection_retry_delay: DEFAULT_CONNECTION_RETRY_DELAY,
            http_timeout: None,
        }
    }
}

impl PlatformEnvironment {
    /// Loads the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup
    ///
    /// The lookup receives fully prefixed variable names. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        let mut config = Self::default();

        if let Some(api_endpoint) = get("API_ENDPOINT") {
            config.api_endpoint = api_endpoint;
        }
        if let Some(stage) = get("STAGE_IDENTIFIER") {
            config.stage_identifier = stage;
        }
        if let Some(issuer_url) = get("ISSUER_URL") {
            config.issuer_url = issuer_url;
        }
        if let Some(client_id) = get("CLIENT_ID") {
            config.client_id = client_id;
        }
        config.id_token = get("ID_TOKEN");
        config.client_secret = get("CLIENT_SECRET");
        config.client_secret_file = get("CLIENT_SECRET_FILE").map(PathBuf::from);
        config.audience = get("AUDIENCE");
        config.scope = get("SCOPE");

        if let Some(headers) = get("EXTRA_HEADERS") {
            config.extra_headers = serde_json::from_str(&headers).map_err(|e| {
                PlatformError::Config(format!(
                    "{ENV_PREFIX}EXTRA_HEADERS must be a JSON object of strings: {e}"
                ))
            })?;
        }
        if let Some(verbose) = get("VERBOSE") {
            config.verbose = parse_bool("VERBOSE", &verbose)?;
        }
        if let Some(delay) = get("CONNECTION_RETRY_DELAY_SECONDS") {
            config.connection_retry_delay =
                Duration::from_secs(parse_seconds("CONNECTION_RETRY_DELAY_SECONDS", &delay)?);
        }
        if let Some(timeout) = get("HTTP_TIMEOUT_SECONDS") {
            config.http_timeout = Some(Duration::from_secs(parse_seconds(
                "HTTP_TIMEOUT_SECONDS",
                &timeout,
            )?));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("API_ENDPOINT", &self.api_endpoint),
            ("ISSUER_URL", &self.issuer_url),
        ] {
            Url::parse(value).map_err(|e| {
                PlatformError::Config(format!("{ENV_PREFIX}{name} is not a valid URL: {e}"))
            })?;
        }

        if self.client_id.is_empty() {
            return Err(PlatformError::Config(format!(
                "{ENV_PREFIX}CLIENT_ID cannot be empty"
            )));
        }

        if self.stage_identifier.contains(['/', '\\']) || self.stage_identifier == ".." {
            return Err(PlatformError::Config(format!(
                "{ENV_PREFIX}STAGE_IDENTIFIER must not contain path separators"
            )));
        }

        Ok(())
    }

    /// The audience expected in tokens; defaults to the client id
    pub fn audience(&self) -> &str {
        self.audience.as_deref().unwrap_or(&self.client_id)
    }

    /// Returns `true` when a client secret is available, directly or as a file
    pub fn has_client_secret(&self) -> bool {
        self.client_secret.is_some() || self.client_secret_file.is_some()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PlatformError::Config(format!(
            "{ENV_PREFIX}{name} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| {
        PlatformError::Config(format!(
            "{ENV_PREFIX}{name} must be a whole number of seconds: {e}"
        ))
    })
}
