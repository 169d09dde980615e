//! OAuth 2.0 device authorization grant (RFC 8628)
//!
//! The interactive login flow. The CLI requests a device code, shows the
//! operator a verification URL and a user code, and polls the token endpoint
//! until the operator approves the login on another device, the provider
//! rejects it, or the device code expires.
//!
//! # State machine
//!
//! ```text
//! Init -> RequestingCode -> AwaitingUserAction <-> Polling -> Authenticated
//!                                                          -> Failed
//!                                                          -> Expired
//! ```
//!
//! Polling has no iteration cap. In production the loop only ends when the
//! provider answers or the process is interrupted; callers can bound it with
//! a [`CancellationToken`] or a deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::client_credentials::load_client_secret;
use crate::auth::discovery::ProviderMetadata;
use crate::auth::validator::RawTokenResponse;
use crate::config::PlatformEnvironment;
use crate::error::{PlatformError, Result};

/// Grant type of the device code token request
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Scope requested when none is configured. Many authorization rules are
/// checked against the email address, so it is requested by default.
pub const DEFAULT_DEVICE_SCOPE: &str = "openid email";

/// Polling interval used when the provider does not specify one
const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Interval increase requested by a `slow_down` answer
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Sleeping
// ---------------------------------------------------------------------------

/// Suspends the poll loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response of the device authorization endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    /// Code exchanged at the token endpoint.
    pub device_code: String,

    /// Code the operator confirms in the browser.
    pub user_code: String,

    /// Minimum number of seconds between poll attempts.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Lifetime of the device code in seconds, informational only.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Verification URL with the user code pre-filled.
    #[serde(default)]
    pub verification_uri_complete: Option<String>,

    /// Standard verification URL.
    #[serde(default)]
    pub verification_uri: Option<String>,

    /// Non-standard spelling used by some providers.
    #[serde(default)]
    pub verification_url: Option<String>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl DeviceAuthorization {
    /// The URL shown to the operator, preferring the pre-filled variant.
    pub fn verification_url(&self) -> Option<&str> {
        self.verification_uri_complete
            .as_deref()
            .or(self.verification_uri.as_deref())
            .or(self.verification_url.as_deref())
    }
}

/// Error body of the token endpoint (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{description} ({})", self.error),
            None => self.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// States of the device authorization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFlowState {
    /// Nothing has been sent yet.
    Init,
    /// The device code request is in flight.
    RequestingCode,
    /// Waiting for the operator between two poll attempts.
    AwaitingUserAction,
    /// A token request is in flight.
    Polling,
    /// The provider issued a token.
    Authenticated,
    /// The provider rejected the flow.
    Failed,
    /// The device code expired or the flow was abandoned.
    Expired,
}

/// Classification of a single poll answer.
#[derive(Debug)]
enum PollStep {
    Authenticated(RawTokenResponse),
    Pending,
    SlowDown,
    Expired(String),
    Failed(String),
}

/// Maps a token endpoint answer onto the next step of the poll loop.
///
/// Some providers answer `200` with an error body, so the body is inspected
/// for an `error` field before it is treated as a token response.
fn classify_poll_response(status: StatusCode, body: &str) -> PollStep {
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
        return match err.error.as_str() {
            "authorization_pending" => PollStep::Pending,
            "slow_down" => PollStep::SlowDown,
            "expired_token" => PollStep::Expired(err.describe()),
            _ => PollStep::Failed(err.describe()),
        };
    }

    if status != StatusCode::OK {
        return PollStep::Failed(format!("token endpoint returned {status}: {body}"));
    }

    match serde_json::from_str::<RawTokenResponse>(body) {
        Ok(tokens) => PollStep::Authenticated(tokens),
        Err(e) => PollStep::Failed(format!("failed to parse token response: {e}")),
    }
}

/// Drives the device authorization grant.
///
/// # Examples
///
/// ```no_run
/// use tenzir_platform::auth::device_flow::DeviceFlow;
/// use tenzir_platform::auth::discovery::fetch_provider_metadata;
/// use tenzir_platform::config::PlatformEnvironment;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = PlatformEnvironment::from_env()?;
/// let http = reqwest::Client::new();
/// let metadata = fetch_provider_metadata(&http, &config.issuer_url).await?;
///
/// let mut flow = DeviceFlow::new(http, metadata, &config);
/// let tokens = flow.run().await?;
/// println!("received id_token: {}", tokens.id_token.is_some());
/// # Ok(())
/// # }
/// ```
pub struct DeviceFlow {
    http: reqwest::Client,
    metadata: ProviderMetadata,
    config: PlatformEnvironment,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    state: DeviceFlowState,
}

impl DeviceFlow {
    /// Creates a flow without deadline that sleeps on the tokio timer.
    pub fn new(
        http: reqwest::Client,
        metadata: ProviderMetadata,
        config: &PlatformEnvironment,
    ) -> Self {
        Self {
            http,
            metadata,
            config: config.clone(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            deadline: None,
            state: DeviceFlowState::Init,
        }
    }

    /// Replaces the sleeper used between poll attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Abandons polling once `cancel` is triggered.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Abandons polling once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The current state of the flow.
    pub fn state(&self) -> DeviceFlowState {
        self.state
    }

    /// Runs the flow to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::AuthFlow`] when the device code request is
    /// rejected, no verification URL is offered, the provider answers a poll
    /// with an error other than `authorization_pending`/`slow_down`, the
    /// device code expires, or the flow is cancelled. Network failures are
    /// returned as [`PlatformError::Transport`].
    pub async fn run(&mut self) -> Result<RawTokenResponse> {
        let authorization = self.authorize().await?;

        if let Some(url) = authorization.verification_url() {
            eprintln!("1. On your computer or mobile device navigate to: {url}");
        }
        eprintln!(
            "2. Verify you're seeing the following code and confirm: {}",
            authorization.user_code
        );
        eprintln!(
            "3. Waiting for confirmation, checking every {} seconds",
            authorization.interval
        );

        self.poll(&authorization).await
    }

    /// Requests a device code and leaves the flow waiting for the operator.
    ///
    /// The returned authorization is guaranteed to carry a verification URL.
    pub async fn authorize(&mut self) -> Result<DeviceAuthorization> {
        let authorization = self.request_device_code().await?;

        if authorization.verification_url().is_none() {
            self.transition(DeviceFlowState::Failed);
            return Err(PlatformError::AuthFlow(
                "device authorization response contains no verification URL".to_string(),
            ));
        }

        self.transition(DeviceFlowState::AwaitingUserAction);
        Ok(authorization)
    }

    async fn request_device_code(&mut self) -> Result<DeviceAuthorization> {
        self.transition(DeviceFlowState::RequestingCode);

        let scope = self.config.scope.as_deref().unwrap_or(DEFAULT_DEVICE_SCOPE);
        let params = [("client_id", self.config.client_id.as_str()), ("scope", scope)];

        let resp = self
            .http
            .post(&self.metadata.device_authorization_endpoint)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| self.fail(PlatformError::Transport(e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.fail(PlatformError::Transport(e)))?;

        if status != StatusCode::OK {
            return Err(self.fail(PlatformError::AuthFlow(format!(
                "error generating the device code ({status}): {body}"
            ))));
        }

        serde_json::from_str(&body).map_err(|e| {
            self.fail(PlatformError::AuthFlow(format!(
                "failed to parse device authorization response: {e}"
            )))
        })
    }

    async fn poll(&mut self, authorization: &DeviceAuthorization) -> Result<RawTokenResponse> {
        let client_secret = load_client_secret(&self.config).map_err(|e| self.fail(e))?;

        let mut params = vec![
            ("grant_type", DEVICE_CODE_GRANT_TYPE.to_string()),
            ("device_code", authorization.device_code.clone()),
            ("client_id", self.config.client_id.clone()),
        ];
        if let Some(secret) = client_secret {
            params.push(("client_secret", secret));
        }

        let mut interval = Duration::from_secs(authorization.interval);

        loop {
            self.transition(DeviceFlowState::Polling);

            let resp = self
                .http
                .post(&self.metadata.token_endpoint)
                .header("Accept", "application/json")
                .form(&params)
                .send()
                .await
                .map_err(|e| self.fail(PlatformError::Transport(e)))?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| self.fail(PlatformError::Transport(e)))?;

            match classify_poll_response(status, &body) {
                PollStep::Authenticated(tokens) => {
                    self.transition(DeviceFlowState::Authenticated);
                    eprintln!("Authenticated!");
                    return Ok(tokens);
                }
                PollStep::Pending => {
                    tracing::debug!("authorization_pending; continuing to poll");
                }
                PollStep::SlowDown => {
                    interval += SLOW_DOWN_INCREMENT;
                    tracing::debug!(?interval, "slow_down received; increasing poll interval");
                }
                PollStep::Expired(reason) => {
                    self.transition(DeviceFlowState::Expired);
                    return Err(PlatformError::AuthFlow(format!(
                        "the device code expired before the login was confirmed: {reason}"
                    )));
                }
                PollStep::Failed(reason) => {
                    self.transition(DeviceFlowState::Failed);
                    return Err(PlatformError::AuthFlow(reason));
                }
            }

            self.transition(DeviceFlowState::AwaitingUserAction);
            if !self.wait(interval).await {
                self.transition(DeviceFlowState::Expired);
                return Err(PlatformError::AuthFlow(
                    "device login was abandoned before it was confirmed".to_string(),
                ));
            }
        }
    }

    /// Sleeps for `interval`; returns `false` if the flow was cancelled or
    /// the deadline passed.
    async fn wait(&self, interval: Duration) -> bool {
        if self.cancel.is_cancelled() || self.deadline_passed() {
            return false;
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.sleeper.sleep(interval) => {}
            _ = self.cancel.cancelled() => return false,
            _ = deadline => return false,
        }

        !self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn transition(&mut self, next: DeviceFlowState) {
        tracing::debug!(from = ?self.state, to = ?next, "device flow transition");
        self.state = next;
    }

    fn fail(&mut self, err: PlatformError) -> PlatformError {
        self.transition(DeviceFlowState::Failed);
        err
    }
}
