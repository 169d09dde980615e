//! OAuth 2.0 client credentials grant
//!
//! The non-interactive login flow for unattended use. The configured client
//! id and secret are exchanged for a token directly. Failures are surfaced
//! immediately and never retried.

use serde::Deserialize;

use crate::auth::discovery::ProviderMetadata;
use crate::auth::validator::RawTokenResponse;
use crate::config::{PlatformEnvironment, ENV_PREFIX};
use crate::error::{PlatformError, Result};

/// Scope requested when none is configured
pub const DEFAULT_CLIENT_CREDENTIALS_SCOPE: &str = "openid";

/// Resolves the configured client secret.
///
/// A secret file takes precedence over a directly configured secret. The file
/// is read when the flow starts; trailing whitespace is stripped.
///
/// Returns `Ok(None)` when no secret is configured.
///
/// # Errors
///
/// Returns [`PlatformError::Config`] if the secret file cannot be read.
pub fn load_client_secret(config: &PlatformEnvironment) -> Result<Option<String>> {
    if let Some(path) = &config.client_secret_file {
        let secret = std::fs::read_to_string(path).map_err(|e| {
            PlatformError::Config(format!(
                "failed to read client secret file {}: {e}",
                path.display()
            ))
        })?;
        return Ok(Some(secret.trim_end().to_string()));
    }
    Ok(config.client_secret.clone())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges the configured client credentials for a token.
///
/// Sends `grant_type=client_credentials` together with the client id,
/// secret, scope and audience as form data, authenticated with HTTP Basic.
///
/// # Errors
///
/// - [`PlatformError::Config`] if no client secret is configured or the
///   secret file is unreadable.
/// - [`PlatformError::Transport`] if the token endpoint is unreachable.
/// - [`PlatformError::AuthFlow`] if the provider rejects the request.
///
/// # Examples
///
/// ```no_run
/// use tenzir_platform::auth::client_credentials::client_credentials_flow;
/// use tenzir_platform::auth::discovery::fetch_provider_metadata;
/// use tenzir_platform::config::PlatformEnvironment;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = PlatformEnvironment::from_env()?;
/// let http = reqwest::Client::new();
/// let metadata = fetch_provider_metadata(&http, &config.issuer_url).await?;
/// let tokens = client_credentials_flow(&http, &metadata, &config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn client_credentials_flow(
    http: &reqwest::Client,
    metadata: &ProviderMetadata,
    config: &PlatformEnvironment,
) -> Result<RawTokenResponse> {
    let client_secret = load_client_secret(config)?.ok_or_else(|| {
        PlatformError::Config(format!(
            "need a client secret in order to perform non-interactive login; \
             set {ENV_PREFIX}CLIENT_SECRET or {ENV_PREFIX}CLIENT_SECRET_FILE"
        ))
    })?;

    let scope = config
        .scope
        .as_deref()
        .unwrap_or(DEFAULT_CLIENT_CREDENTIALS_SCOPE);
    let params = [
        ("grant_type", "client_credentials"),
        ("scope", scope),
        ("client_id", config.client_id.as_str()),
        ("client_secret", client_secret.as_str()),
        ("audience", config.audience()),
    ];

    tracing::debug!(endpoint = %metadata.token_endpoint, "requesting client credentials token");

    let resp = http
        .post(&metadata.token_endpoint)
        .basic_auth(&config.client_id, Some(&client_secret))
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await
        .map_err(PlatformError::Transport)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let reason = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(ErrorBody {
                error_description: Some(description),
                ..
            }) => description,
            Ok(ErrorBody {
                error: Some(error), ..
            }) => error,
            _ => body,
        };
        return Err(PlatformError::AuthFlow(format!(
            "client credentials login failed ({status}): {reason}"
        )));
    }

    resp.json::<RawTokenResponse>()
        .await
        .map_err(|e| PlatformError::AuthFlow(format!("failed to parse token response: {e}")))
}
