//! Token acquisition policy
//!
//! [`TokenManager`] decides which credential is authoritative and runs a
//! login flow when needed. The precedence is:
//!
//! 1. a hardcoded token from `TENZIR_PLATFORM_CLI_ID_TOKEN`, which must
//!    validate (a failure is fatal and never falls through);
//! 2. the cached token, if it validates;
//! 3. a fresh token from the client credentials flow or the device flow,
//!    which is validated and written to the cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::cache::TokenCache;
use crate::auth::client_credentials::client_credentials_flow;
use crate::auth::device_flow::{DeviceFlow, Sleeper, TokioSleeper};
use crate::auth::discovery::{fetch_provider_metadata, ProviderMetadata};
use crate::auth::validator::{resolve_grant_token, TokenValidator, ValidToken};
use crate::config::{PlatformEnvironment, ENV_PREFIX};
use crate::error::{PlatformError, Result};

/// Login flow used to obtain a fresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// Device authorization grant, requires an operator.
    Interactive,
    /// Client credentials grant, requires a client secret.
    NonInteractive,
}

impl LoginFlow {
    /// Picks the flow for an optional explicit choice.
    ///
    /// Without an explicit choice the non-interactive flow is used when a
    /// client secret is configured.
    pub fn select(interactive: Option<bool>, config: &PlatformEnvironment) -> Self {
        match interactive {
            Some(true) => LoginFlow::Interactive,
            Some(false) => LoginFlow::NonInteractive,
            None if config.has_client_secret() => LoginFlow::NonInteractive,
            None => LoginFlow::Interactive,
        }
    }
}

/// Coordinates validation, caching, and the login flows.
///
/// # Examples
///
/// ```no_run
/// use tenzir_platform::auth::cache::TokenCache;
/// use tenzir_platform::auth::manager::TokenManager;
/// use tenzir_platform::config::PlatformEnvironment;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = PlatformEnvironment::from_env()?;
/// let cache = TokenCache::for_environment(&config)?;
/// let manager = TokenManager::discover(reqwest::Client::new(), &config, cache).await?;
///
/// let token = manager.obtain_valid_token(None).await?;
/// println!("Logged in as {}", token.identity.user_id());
/// # Ok(())
/// # }
/// ```
pub struct TokenManager {
    http: reqwest::Client,
    config: PlatformEnvironment,
    metadata: ProviderMetadata,
    validator: TokenValidator,
    cache: TokenCache,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    poll_timeout: Option<Duration>,
}

impl TokenManager {
    /// Creates a manager from already discovered provider metadata.
    pub fn new(
        http: reqwest::Client,
        config: &PlatformEnvironment,
        metadata: ProviderMetadata,
        cache: TokenCache,
    ) -> Self {
        let validator = TokenValidator::new(
            http.clone(),
            &metadata,
            config.issuer_url.clone(),
            config.audience(),
        );
        Self {
            http,
            config: config.clone(),
            metadata,
            validator,
            cache,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            poll_timeout: None,
        }
    }

    /// Performs provider discovery and creates a manager.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Discovery`] if the provider metadata cannot be
    /// fetched.
    pub async fn discover(
        http: reqwest::Client,
        config: &PlatformEnvironment,
        cache: TokenCache,
    ) -> Result<Self> {
        let metadata = fetch_provider_metadata(&http, &config.issuer_url).await?;
        Ok(Self::new(http, config, metadata, cache))
    }

    /// Replaces the sleeper used by the device flow.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Cancels device flow polling once `cancel` is triggered.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bounds device flow polling. Unbounded by default.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Returns a validated token, logging in if necessary.
    ///
    /// `interactive` forces the device flow (`Some(true)`) or the client
    /// credentials flow (`Some(false)`) when a fresh login is needed.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::InvalidToken`] if the hardcoded token or the freshly
    ///   issued token fails validation.
    /// - [`PlatformError::AuthFlow`] or [`PlatformError::Config`] if the login
    ///   flow fails.
    /// - [`PlatformError::Discovery`] if the signing keys are unavailable.
    pub async fn obtain_valid_token(&self, interactive: Option<bool>) -> Result<ValidToken> {
        if let Some(token) = &self.config.id_token {
            tracing::debug!("using hardcoded token from the environment");
            let identity = self.validator.validate(token).await.map_err(|e| match e {
                PlatformError::InvalidToken(reason) => PlatformError::InvalidToken(format!(
                    "while validating the hardcoded token from {ENV_PREFIX}ID_TOKEN: {reason}"
                )),
                other => other,
            })?;
            return Ok(ValidToken {
                token: token.clone(),
                identity,
            });
        }

        match self.cache.load() {
            Some(token) => match self.validator.validate(&token).await {
                Ok(identity) => {
                    tracing::debug!(user = identity.user_id(), "using cached token");
                    return Ok(ValidToken { token, identity });
                }
                Err(e) if e.is_invalid_token() => {
                    tracing::info!(reason = %e, "cached token is not valid, reauthenticating");
                }
                Err(other) => return Err(other),
            },
            None => tracing::info!("no cached token, authenticating"),
        }

        self.reauthenticate(LoginFlow::select(interactive, &self.config))
            .await
    }

    /// Runs a login flow, validates its result, and stores it in the cache.
    pub async fn reauthenticate(&self, flow: LoginFlow) -> Result<ValidToken> {
        tracing::debug!(?flow, "starting login flow");

        let response = match flow {
            LoginFlow::NonInteractive => {
                client_credentials_flow(&self.http, &self.metadata, &self.config).await?
            }
            LoginFlow::Interactive => {
                let mut device_flow =
                    DeviceFlow::new(self.http.clone(), self.metadata.clone(), &self.config)
                        .with_sleeper(Arc::clone(&self.sleeper))
                        .with_cancellation(self.cancel.clone());
                if let Some(timeout) = self.poll_timeout {
                    device_flow = device_flow.with_deadline(Instant::now() + timeout);
                }
                device_flow.run().await?
            }
        };

        let valid = resolve_grant_token(response, &self.validator).await?;
        if self.config.verbose {
            tracing::info!(claims = %valid.identity, "obtained token");
        }
        self.cache.store(&valid.token)?;
        Ok(valid)
    }
}
