//! Tenzir Platform CLI library
//!
//! This library obtains, validates, and caches the OIDC identity token used
//! to authorize requests against the Tenzir Platform API.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: provider discovery, token validation, login flows, token cache,
//!   and the precedence policy tying them together
//! - `client`: authenticated request client for the platform API
//! - `auth_rule`: workspace authorization rules submitted to the admin API
//! - `config`: environment-derived configuration
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use tenzir_platform::auth::cache::TokenCache;
//! use tenzir_platform::auth::manager::TokenManager;
//! use tenzir_platform::{AppClient, PlatformEnvironment};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PlatformEnvironment::from_env()?;
//!     let cache = TokenCache::for_environment(&config)?;
//!     let manager = TokenManager::discover(reqwest::Client::new(), &config, cache).await?;
//!
//!     let token = manager.obtain_valid_token(None).await?;
//!     let mut client = AppClient::new(&config)?;
//!     client.user_login(token.token);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod auth_rule;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::manager::TokenManager;
pub use auth::validator::{TokenValidator, ValidToken, ValidatedIdentity};
pub use auth_rule::AuthRule;
pub use client::{AppClient, TargetApi};
pub use config::PlatformEnvironment;
pub use error::{PlatformError, Result};

#[cfg(test)]
pub mod test_utils;
