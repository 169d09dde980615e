//! Workspace authorization rules
//!
//! Rules are built on the client and submitted to the admin API unchanged;
//! the platform evaluates them. The JSON form is tagged by `auth_fn`:
//!
//! ```json
//! {"auth_fn": "auth_email_suffix", "connection": "google-oauth2", "email_domain": "@tenzir.com"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A rule granting users access to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_fn")]
pub enum AuthRule {
    /// Grants access to a single user.
    #[serde(rename = "auth_user")]
    User { user_id: String },

    /// Grants access to users with an email address in a domain.
    #[serde(rename = "auth_email_suffix")]
    EmailDomain {
        #[serde(default)]
        connection: Option<String>,
        email_domain: String,
    },

    /// Grants access to members of an organization.
    #[serde(rename = "auth_organization")]
    OrganizationMembership {
        #[serde(default)]
        connection: Option<String>,
        organization_claim: String,
        organization: String,
    },

    /// Grants access to users holding a role within an organization.
    #[serde(rename = "auth_organization_role")]
    OrganizationRole {
        #[serde(default)]
        connection: Option<String>,
        roles_claim: String,
        role: String,
        organization_claim: String,
        organization: String,
    },

    /// Grants access to every authenticated user.
    #[serde(rename = "auth_allow_all")]
    AllowAll,
}

impl AuthRule {
    /// The `auth_fn` discriminant of this rule.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthRule::User { .. } => "auth_user",
            AuthRule::EmailDomain { .. } => "auth_email_suffix",
            AuthRule::OrganizationMembership { .. } => "auth_organization",
            AuthRule::OrganizationRole { .. } => "auth_organization_role",
            AuthRule::AllowAll => "auth_allow_all",
        }
    }

    /// Request body for the `add-auth-function` admin endpoint.
    pub fn add_payload(&self, workspace_id: &str) -> serde_json::Value {
        serde_json::json!({
            "tenant_id": workspace_id,
            "auth_fn": self,
        })
    }
}

impl fmt::Display for AuthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let via = |connection: &Option<String>| match connection {
            Some(connection) => format!(" via {connection}"),
            None => String::new(),
        };
        match self {
            AuthRule::User { user_id } => write!(f, "user {user_id}"),
            AuthRule::EmailDomain {
                connection,
                email_domain,
            } => write!(f, "email domain {email_domain}{}", via(connection)),
            AuthRule::OrganizationMembership {
                connection,
                organization_claim,
                organization,
            } => write!(
                f,
                "members of {organization} ({organization_claim}){}",
                via(connection)
            ),
            AuthRule::OrganizationRole {
                connection,
                roles_claim,
                role,
                organization_claim,
                organization,
            } => write!(
                f,
                "role {role} ({roles_claim}) in {organization} ({organization_claim}){}",
                via(connection)
            ),
            AuthRule::AllowAll => write!(f, "all users"),
        }
    }
}
