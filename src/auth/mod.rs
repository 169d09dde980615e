//! OIDC token lifecycle
//!
//! Obtains, validates, and caches the identity token the CLI presents to the
//! platform API.
//!
//! # Module Layout
//!
//! - [`discovery`]          -- OIDC provider metadata
//! - [`validator`]          -- JWT signature and claim validation against the
//!   provider's key set
//! - [`device_flow`]        -- RFC 8628 device authorization grant
//! - [`client_credentials`] -- client credentials grant for unattended use
//! - [`cache`]              -- per-stage on-disk token cache
//! - [`manager`]            -- precedence between hardcoded, cached, and fresh
//!   tokens

pub mod cache;
pub mod client_credentials;
pub mod device_flow;
pub mod discovery;
pub mod manager;
pub mod validator;
