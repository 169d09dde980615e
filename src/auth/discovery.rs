//! OpenID Connect provider discovery
//!
//! Fetches the provider metadata document from
//! `<issuer>/.well-known/openid-configuration` and extracts the endpoints the
//! login flows and the token validator need.
//!
//! # References
//!
//! - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};

/// Endpoints advertised by an OIDC provider
///
/// Fetched once per process and shared read-only with the validator and the
/// login flows.
///
/// # Examples
///
/// ```
/// use tenzir_platform::auth::discovery::ProviderMetadata;
///
/// let json = r#"{
///     "issuer": "https://auth.example.com/",
///     "jwks_uri": "https://auth.example.com/.well-known/jwks.json",
///     "token_endpoint": "https://auth.example.com/oauth/token",
///     "device_authorization_endpoint": "https://auth.example.com/oauth/device/code"
/// }"#;
///
/// let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.token_endpoint, "https://auth.example.com/oauth/token");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// URL of the JSON Web Key Set holding the token signing keys.
    pub jwks_uri: String,

    /// URL of the token endpoint.
    pub token_endpoint: String,

    /// URL of the device authorization endpoint (RFC 8628).
    pub device_authorization_endpoint: String,
}

/// Builds the discovery document URL for an issuer.
///
/// Trailing slashes on the issuer are ignored.
pub fn discovery_url(issuer_url: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer_url.trim_end_matches('/')
    )
}

/// Extracts the required endpoints from a parsed discovery document.
fn metadata_from_document(
    document: &HashMap<String, serde_json::Value>,
) -> Result<ProviderMetadata> {
    let field = |name: &str| -> Result<String> {
        match document.get(name) {
            Some(serde_json::Value::String(value)) if !value.is_empty() => Ok(value.clone()),
            Some(_) => Err(PlatformError::Discovery(format!(
                "field '{name}' in provider metadata is not a non-empty string"
            ))),
            None => Err(PlatformError::Discovery(format!(
                "provider metadata is missing required field '{name}'"
            ))),
        }
    };

    Ok(ProviderMetadata {
        jwks_uri: field("jwks_uri")?,
        token_endpoint: field("token_endpoint")?,
        device_authorization_endpoint: field("device_authorization_endpoint")?,
    })
}

/// Fetches the provider metadata for an issuer.
///
/// # Errors
///
/// Returns [`PlatformError::Discovery`] if the endpoint is unreachable,
/// answers with a non-success status, or serves a document that is not a
/// JSON object holding `jwks_uri`, `token_endpoint` and
/// `device_authorization_endpoint`. There is no retry.
///
/// # Examples
///
/// ```no_run
/// use tenzir_platform::auth::discovery::fetch_provider_metadata;
///
/// # async fn example() -> tenzir_platform::error::Result<()> {
/// let http = reqwest::Client::new();
/// let meta = fetch_provider_metadata(&http, "https://tenzir.eu.auth0.com/").await?;
/// println!("token endpoint: {}", meta.token_endpoint);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    issuer_url: &str,
) -> Result<ProviderMetadata> {
    let url = discovery_url(issuer_url);
    tracing::debug!(%url, "fetching provider metadata");

    let resp = http
        .get(&url)
        .send()
        .await
        .map_err(|e| PlatformError::Discovery(format!("failed to reach {url}: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PlatformError::Discovery(format!(
            "{url} returned {status}: {body}"
        )));
    }

    let document: HashMap<String, serde_json::Value> = resp.json().await.map_err(|e| {
        PlatformError::Discovery(format!("failed to parse provider metadata from {url}: {e}"))
    })?;

    metadata_from_document(&document)
}
