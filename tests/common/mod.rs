//! Shared helpers for integration tests
//!
//! A wiremock-backed fake OIDC provider serving discovery, the key set, and
//! the token endpoints, plus a sleeper that records instead of sleeping.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tenzir_platform::auth::device_flow::Sleeper;
use tenzir_platform::auth::discovery::ProviderMetadata;
use tenzir_platform::config::PlatformEnvironment;

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const ROGUE_KEY_PEM: &str = include_str!("../fixtures/rogue_key.pem");
pub const SIGNING_JWKS: &str = include_str!("../fixtures/signing_jwks.json");
pub const TEST_KID: &str = "test-key-1";
pub const TEST_CLIENT_ID: &str = "test-client";

pub const DEVICE_PATH: &str = "/oauth/device/code";
pub const TOKEN_PATH: &str = "/oauth/token";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A fake OIDC provider
pub struct FakeProvider {
    pub server: MockServer,
}

impl FakeProvider {
    /// Starts a provider serving discovery and the key set
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let provider = Self { server };

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": provider.issuer(),
                "jwks_uri": provider.url(JWKS_PATH),
                "token_endpoint": provider.url(TOKEN_PATH),
                "device_authorization_endpoint": provider.url(DEVICE_PATH),
            })))
            .mount(&provider.server)
            .await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(SIGNING_JWKS, "application/json"),
            )
            .mount(&provider.server)
            .await;

        provider
    }

    /// Issuer as it appears in the `iss` claim, with a trailing slash
    pub fn issuer(&self) -> String {
        format!("{}/", self.server.uri())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            jwks_uri: self.url(JWKS_PATH),
            token_endpoint: self.url(TOKEN_PATH),
            device_authorization_endpoint: self.url(DEVICE_PATH),
        }
    }

    /// Configuration pointing at this provider
    pub fn config(&self) -> PlatformEnvironment {
        PlatformEnvironment {
            issuer_url: self.issuer(),
            client_id: TEST_CLIENT_ID.to_string(),
            ..Default::default()
        }
    }

    /// Claims accepted for this provider, valid for one hour
    pub fn claims(&self, sub: &str) -> serde_json::Value {
        let now = chrono::Utc::now().timestamp();
        serde_json::json!({
            "sub": sub,
            "iss": self.issuer(),
            "aud": TEST_CLIENT_ID,
            "iat": now,
            "exp": now + 3600,
        })
    }

    /// Claims that expired an hour ago
    pub fn expired_claims(&self, sub: &str) -> serde_json::Value {
        let now = chrono::Utc::now().timestamp();
        serde_json::json!({
            "sub": sub,
            "iss": self.issuer(),
            "aud": TEST_CLIENT_ID,
            "iat": now - 7200,
            "exp": now - 3600,
        })
    }

    /// A valid token for `sub`
    pub fn token(&self, sub: &str) -> String {
        sign(SIGNING_KEY_PEM, &self.claims(sub))
    }
}

/// Signs `claims` with the given key under [`TEST_KID`]
pub fn sign(pem: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key is valid");
    encode(&header, claims, &key).expect("signing succeeds")
}

/// Records requested sleeps and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("lock").push(duration);
    }
}

/// Body of a token endpoint error response
pub fn token_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(serde_json::json!({
        "error": code,
        "error_description": format!("{code} description"),
    }))
}

/// Body of a device authorization response
pub fn device_authorization(interval: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "device_code": "dev-123",
        "user_code": "ABCD-EFGH",
        "verification_uri": "https://auth.example.com/activate",
        "verification_uri_complete": "https://auth.example.com/activate?user_code=ABCD-EFGH",
        "expires_in": 900,
        "interval": interval,
    }))
}

/// URL of a local port nothing listens on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
