//! Test utilities for the Tenzir Platform CLI
//!
//! Provides a fixed RSA signing key, the matching key set, and helpers to
//! mint signed tokens with arbitrary claims.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

/// Private key matching the key set in `tests/fixtures/signing_jwks.json`
pub const SIGNING_KEY_PEM: &str = include_str!("../tests/fixtures/signing_key.pem");

/// A key the provider does not publish
pub const ROGUE_KEY_PEM: &str = include_str!("../tests/fixtures/rogue_key.pem");

/// Key set published by the fake provider
pub const SIGNING_JWKS: &str = include_str!("../tests/fixtures/signing_jwks.json");

/// Key id of the published signing key
pub const TEST_KID: &str = "test-key-1";

/// Issuer used in test tokens
pub const TEST_ISSUER: &str = "https://auth.example.com/";

/// Audience used in test tokens
pub const TEST_AUDIENCE: &str = "test-client";

/// Parses the published test key set
pub fn test_key_set() -> JwkSet {
    serde_json::from_str(SIGNING_JWKS).expect("fixture key set is valid")
}

/// Claims accepted by a validator configured with [`TEST_ISSUER`] and
/// [`TEST_AUDIENCE`], valid for one hour
pub fn test_claims(sub: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    serde_json::json!({
        "sub": sub,
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "iat": now,
        "exp": now + 3600,
    })
}

/// Signs `claims` with the published key
pub fn signed_token(claims: &serde_json::Value) -> String {
    signed_token_with(SIGNING_KEY_PEM, Some(TEST_KID), claims)
}

/// Signs `claims` with an arbitrary RSA key and key id
pub fn signed_token_with(pem: &str, kid: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key is valid");
    encode(&header, claims, &key).expect("signing succeeds")
}
