//! Bearer token validation
//!
//! Every token the CLI trusts, whether cached, hardcoded through the
//! environment, or freshly issued by a login flow, passes through
//! [`TokenValidator::validate`]. The validator resolves the signing key from
//! the provider's JSON Web Key Set, verifies the signature with the provider's
//! asymmetric algorithm, and checks `exp`, `iss` and `aud` before the subject
//! claim is inspected.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::auth::discovery::ProviderMetadata;
use crate::error::{PlatformError, Result};

/// Algorithms accepted for token signatures. Symmetric algorithms are
/// rejected.
const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

// ---------------------------------------------------------------------------
// ValidatedIdentity
// ---------------------------------------------------------------------------

/// The verified claim set of a token.
///
/// Construction guarantees a non-empty string `sub` claim.
///
/// # Examples
///
/// ```
/// use tenzir_platform::auth::validator::ValidatedIdentity;
///
/// let claims = serde_json::json!({
///     "sub": "google-oauth2|1234",
///     "email": "jane@example.com",
///     "groups": ["admins"]
/// });
/// let identity = ValidatedIdentity::from_claims(serde_json::from_value(claims).unwrap()).unwrap();
///
/// assert_eq!(identity.user_id(), "google-oauth2|1234");
/// assert!(identity.check_connection("google-oauth2"));
/// assert_eq!(identity.claim_str("email", "").unwrap(), "jane@example.com");
/// assert_eq!(identity.claim_list("roles", &[]).unwrap(), Vec::<String>::new());
/// ```
#[derive(Debug, Clone)]
pub struct ValidatedIdentity {
    user_id: String,
    claims: HashMap<String, serde_json::Value>,
}

impl ValidatedIdentity {
    /// Builds an identity from a decoded claim set.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidToken`] if `sub` is absent, not a
    /// string, or empty.
    pub fn from_claims(claims: HashMap<String, serde_json::Value>) -> Result<Self> {
        let user_id = match claims.get("sub") {
            Some(serde_json::Value::String(sub)) if !sub.is_empty() => sub.clone(),
            _ => {
                return Err(PlatformError::InvalidToken(
                    "sub string required in OIDC token".to_string(),
                ))
            }
        };
        Ok(Self { user_id, claims })
    }

    /// The subject of the token.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns `true` when the subject was issued through the given identity
    /// provider connection, i.e. it starts with `"<connection>|"`.
    pub fn check_connection(&self, connection: &str) -> bool {
        self.user_id
            .strip_prefix(connection)
            .is_some_and(|rest| rest.starts_with('|'))
    }

    /// Returns a string claim, or `default` when the claim is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidToken`] if the claim exists but is not
    /// a string.
    pub fn claim_str(&self, key: &str, default: &str) -> Result<String> {
        match self.claims.get(key) {
            None => Ok(default.to_string()),
            Some(serde_json::Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(PlatformError::InvalidToken(format!(
                "{key} is expected to be a string"
            ))),
        }
    }

    /// Returns a string-list claim, or `default` when the claim is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidToken`] if the claim exists but is not
    /// a list of strings.
    pub fn claim_list(&self, key: &str, default: &[&str]) -> Result<Vec<String>> {
        let Some(value) = self.claims.get(key) else {
            return Ok(default.iter().map(|s| s.to_string()).collect());
        };

        let invalid =
            || PlatformError::InvalidToken(format!("{key} is expected to be a list of strings"));
        value
            .as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    }

    /// Expiry time of the token, if the `exp` claim is present.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .get("exp")
            .and_then(serde_json::Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

impl fmt::Display for ValidatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let claims = serde_json::to_string(&self.claims).map_err(|_| fmt::Error)?;
        write!(f, "{claims}")
    }
}

// ---------------------------------------------------------------------------
// TokenValidator
// ---------------------------------------------------------------------------

/// Verifies tokens against the provider's published signing keys.
///
/// The key set is fetched lazily on first use and kept for the lifetime of
/// the validator.
pub struct TokenValidator {
    http: reqwest::Client,
    jwks_uri: String,
    issuer: String,
    audience: String,
    jwks: OnceCell<JwkSet>,
}

impl TokenValidator {
    /// Creates a validator for the given issuer and audience.
    ///
    /// `issuer` must equal the `iss` claim of accepted tokens verbatim.
    pub fn new(
        http: reqwest::Client,
        metadata: &ProviderMetadata,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            http,
            jwks_uri: metadata.jwks_uri.clone(),
            issuer: issuer.into(),
            audience: audience.into(),
            jwks: OnceCell::new(),
        }
    }

    /// Creates a validator with a pre-loaded key set. No network access is
    /// performed for key resolution.
    pub fn with_key_set(
        key_set: JwkSet,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            jwks_uri: String::new(),
            issuer: issuer.into(),
            audience: audience.into(),
            jwks: OnceCell::new_with(Some(key_set)),
        }
    }

    /// The audience this validator expects.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verifies a token and returns its identity.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidToken`] on malformed structure,
    /// unknown signing key, disallowed algorithm, signature mismatch, expiry,
    /// issuer or audience mismatch, or a missing/malformed subject. Returns
    /// [`PlatformError::Discovery`] if the key set cannot be fetched.
    pub async fn validate(&self, token: &str) -> Result<ValidatedIdentity> {
        let header = decode_header(token)
            .map_err(|e| PlatformError::InvalidToken(format!("malformed token: {e}")))?;

        if !ASYMMETRIC_ALGORITHMS.contains(&header.alg) {
            return Err(PlatformError::InvalidToken(format!(
                "token is signed with unsupported algorithm {:?}",
                header.alg
            )));
        }

        let key_set = self.key_set().await?;
        let jwk = select_jwk(key_set, header.kid.as_deref())?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| {
            PlatformError::InvalidToken(format!("signing key cannot be used: {e}"))
        })?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let data = decode::<HashMap<String, serde_json::Value>>(token, &key, &validation)
            .map_err(|e| PlatformError::InvalidToken(describe_jwt_error(&e)))?;

        ValidatedIdentity::from_claims(data.claims)
    }

    async fn key_set(&self) -> Result<&JwkSet> {
        self.jwks
            .get_or_try_init(|| fetch_key_set(&self.http, &self.jwks_uri))
            .await
    }
}

/// Fetches the JSON Web Key Set from the provider.
async fn fetch_key_set(http: &reqwest::Client, jwks_uri: &str) -> Result<JwkSet> {
    tracing::debug!(%jwks_uri, "fetching signing keys");

    let resp = http
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| PlatformError::Discovery(format!("failed to fetch {jwks_uri}: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PlatformError::Discovery(format!(
            "{jwks_uri} returned {status}"
        )));
    }

    resp.json::<JwkSet>()
        .await
        .map_err(|e| PlatformError::Discovery(format!("failed to parse key set: {e}")))
}

/// Picks the signing key for a token.
///
/// Without a `kid` header the key set must contain exactly one key.
fn select_jwk<'a>(key_set: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk> {
    match kid {
        Some(kid) => key_set.find(kid).ok_or_else(|| {
            PlatformError::InvalidToken(format!("no signing key found for kid '{kid}'"))
        }),
        None => match key_set.keys.as_slice() {
            [only] => Ok(only),
            [] => Err(PlatformError::InvalidToken(
                "provider publishes no signing keys".to_string(),
            )),
            _ => Err(PlatformError::InvalidToken(
                "token has no kid and the provider publishes several keys".to_string(),
            )),
        },
    }
}

fn describe_jwt_error(err: &jsonwebtoken::errors::Error) -> String {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature => "signature verification failed".to_string(),
        ErrorKind::ExpiredSignature => "token has expired".to_string(),
        ErrorKind::InvalidIssuer => "issuer does not match the configured issuer".to_string(),
        ErrorKind::InvalidAudience => {
            "audience does not match the configured audience".to_string()
        }
        ErrorKind::MissingRequiredClaim(claim) => format!("token is missing the '{claim}' claim"),
        ErrorKind::ImmatureSignature => "token is not valid yet".to_string(),
        _ => format!("token could not be verified: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Token-type resolution
// ---------------------------------------------------------------------------

/// Raw result of a grant exchange at the token endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTokenResponse {
    /// OIDC id token, preferred when present.
    #[serde(default)]
    pub id_token: Option<String>,

    /// OAuth access token, only used when it is itself a verifiable JWT.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// A token that passed validation, together with its identity.
#[derive(Debug, Clone)]
pub struct ValidToken {
    /// The bearer token string.
    pub token: String,

    /// The verified claims of `token`.
    pub identity: ValidatedIdentity,
}

/// Extracts and validates the token of a grant response.
///
/// The `id_token` field takes precedence. When it is absent, the
/// `access_token` is accepted only if it validates as a JWT issued for this
/// client, and a warning is emitted since the provider deviates from the
/// OIDC specification.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidToken`] when neither field is present,
/// when the chosen token fails validation, or when the access token is opaque.
pub async fn resolve_grant_token(
    response: RawTokenResponse,
    validator: &TokenValidator,
) -> Result<ValidToken> {
    if let Some(token) = response.id_token {
        let identity = validator.validate(&token).await?;
        return Ok(ValidToken { token, identity });
    }

    let Some(token) = response.access_token else {
        return Err(PlatformError::InvalidToken(
            "token response contains neither an id_token nor an access_token".to_string(),
        ));
    };

    tracing::warn!(
        "identity provider did not return an id_token, falling back to the access_token"
    );

    if token.split('.').count() != 3 {
        return Err(PlatformError::InvalidToken(format!(
            "the provider returned an opaque access_token that cannot be verified; \
             configure the provider to issue an id_token or a JWT access token for audience '{}'",
            validator.audience()
        )));
    }

    let identity = validator.validate(&token).await.map_err(|e| match e {
        PlatformError::InvalidToken(reason) => PlatformError::InvalidToken(format!(
            "the access_token returned instead of an id_token failed validation: {reason}"
        )),
        other => other,
    })?;

    Ok(ValidToken { token, identity })
}
