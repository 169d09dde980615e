//! Authenticated request client for the platform API
//!
//! [`AppClient`] issues requests against one of the logical API targets and
//! attaches the credential that target requires. Connection failures are
//! retried with a fixed delay; HTTP error statuses are handed back to the
//! caller untouched.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response};

use crate::config::PlatformEnvironment;
use crate::error::{PlatformError, Result};

/// Header carrying the identity token on admin requests (`X-Tenzir-AdminKey`)
pub const ADMIN_KEY_HEADER: &str = "x-tenzir-adminkey";

/// Header carrying the workspace key on user requests (`X-Tenzir-UserKey`)
pub const USER_KEY_HEADER: &str = "x-tenzir-userkey";

/// Logical API target of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetApi {
    /// Workspace-scoped endpoints, authorized by the workspace user key.
    User,
    /// Unauthenticated endpoints below the user API.
    UserPublic,
    /// Administrative endpoints, authorized by the identity token.
    Admin,
}

impl TargetApi {
    fn path(self) -> &'static str {
        match self {
            TargetApi::User | TargetApi::UserPublic => "user",
            TargetApi::Admin => "admin",
        }
    }
}

/// Builds the HTTP client shared by the login flows and [`AppClient`].
///
/// Applies the configured request timeout, if any.
pub fn build_http_client(config: &PlatformEnvironment) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.http_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(PlatformError::Transport)
}

fn extra_header_map(config: &PlatformEnvironment) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            PlatformError::Config(format!("invalid extra header name '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            PlatformError::Config(format!("invalid value for extra header '{name}': {e}"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Client for the platform's REST API.
///
/// # Examples
///
/// ```no_run
/// use tenzir_platform::client::{error_for_status, AppClient, TargetApi};
/// use tenzir_platform::config::PlatformEnvironment;
///
/// # async fn example(id_token: String) -> anyhow::Result<()> {
/// let config = PlatformEnvironment::from_env()?;
/// let mut client = AppClient::new(&config)?;
/// client.user_login(id_token);
///
/// let resp = client
///     .post("global-tenant-list", &serde_json::json!({}), TargetApi::Admin, 0)
///     .await?;
/// let tenants: serde_json::Value = error_for_status(resp).await?.json().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AppClient {
    http: reqwest::Client,
    endpoint_prefix: String,
    extra_headers: HeaderMap,
    retry_delay: Duration,
    id_token: Option<String>,
    user_key: Option<String>,
}

impl AppClient {
    /// Creates an unauthenticated client for the configured API endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Config`] if an extra header is not a valid
    /// HTTP header.
    pub fn new(config: &PlatformEnvironment) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            endpoint_prefix: config.api_endpoint.trim_end_matches('/').to_string(),
            extra_headers: extra_header_map(config)?,
            retry_delay: config.connection_retry_delay,
            id_token: None,
            user_key: None,
        })
    }

    /// Authorizes admin requests with a validated identity token.
    pub fn user_login(&mut self, id_token: impl Into<String>) {
        self.id_token = Some(id_token.into());
    }

    /// Authorizes user requests with a workspace key.
    pub fn workspace_login(&mut self, user_key: impl Into<String>) {
        self.user_key = Some(user_key.into());
    }

    /// Sends a request to `{api_endpoint}/{user|admin}/{endpoint_suffix}`.
    ///
    /// Connection failures are retried up to `connection_retry` times.
    ///
    /// # Panics
    ///
    /// Panics when targeting [`TargetApi::User`] before
    /// [`workspace_login`](Self::workspace_login) or [`TargetApi::Admin`]
    /// before [`user_login`](Self::user_login).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Transport`] once all attempts failed. Error
    /// statuses are returned as `Ok` responses; see [`error_for_status`].
    pub async fn request(
        &self,
        method: Method,
        endpoint_suffix: &str,
        json: Option<&serde_json::Value>,
        target: TargetApi,
        connection_retry: u32,
    ) -> Result<Response> {
        let mut headers = self.extra_headers.clone();
        match target {
            TargetApi::User => {
                let Some(user_key) = self.user_key.as_deref() else {
                    panic!("missing workspace_login() before making user api requests");
                };
                headers.insert(
                    HeaderName::from_static(USER_KEY_HEADER),
                    header_value(user_key)?,
                );
            }
            TargetApi::UserPublic => {}
            TargetApi::Admin => {
                let Some(id_token) = self.id_token.as_deref() else {
                    panic!("missing user_login() before making admin api requests");
                };
                headers.insert(
                    HeaderName::from_static(ADMIN_KEY_HEADER),
                    header_value(id_token)?,
                );
            }
        }

        let url = format!(
            "{}/{}/{}",
            self.endpoint_prefix,
            target.path(),
            endpoint_suffix
        );

        let mut attempt = 0;
        loop {
            tracing::debug!(%method, %url, attempt, "sending request");
            let mut request = self
                .http
                .request(method.clone(), &url)
                .headers(headers.clone());
            if let Some(body) = json {
                request = request.json(body);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_connect() && attempt < connection_retry => {
                    attempt += 1;
                    tracing::warn!(
                        delay = ?self.retry_delay,
                        attempt,
                        "connection error, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(PlatformError::Transport(e)),
            }
        }
    }

    /// Sends a `POST` with a JSON body.
    pub async fn post(
        &self,
        endpoint_suffix: &str,
        json: &serde_json::Value,
        target: TargetApi,
        connection_retry: u32,
    ) -> Result<Response> {
        self.request(
            Method::POST,
            endpoint_suffix,
            Some(json),
            target,
            connection_retry,
        )
        .await
    }

    /// Sends a `GET` without a body.
    pub async fn get(
        &self,
        endpoint_suffix: &str,
        target: TargetApi,
        connection_retry: u32,
    ) -> Result<Response> {
        self.request(Method::GET, endpoint_suffix, None, target, connection_retry)
            .await
    }
}

fn header_value(credential: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(credential)
        .map_err(|e| PlatformError::Config(format!("credential is not a valid header value: {e}")))
}

/// Converts a non-success response into [`PlatformError::Api`].
///
/// The response body is read and kept as the error message.
pub async fn error_for_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(PlatformError::Api {
        status: status.as_u16(),
        body,
    })
}
