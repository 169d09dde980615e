//! Command-line interface definition for the Tenzir Platform CLI
//!
//! This module defines the CLI structure using clap's derive API. Connection
//! settings are not flags; they come from `TENZIR_PLATFORM_CLI_*` environment
//! variables (see [`crate::config`]).

use clap::{Parser, Subcommand};

use crate::auth_rule::AuthRule;

/// Tenzir Platform CLI
///
/// Manages authentication and workspace access on the Tenzir Platform.
#[derive(Parser, Debug, Clone)]
#[command(name = "tenzir-platform")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in to the platform
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Select the workspace for user-scoped commands
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommand,
    },

    /// Inspect the nodes of the selected workspace
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Administrative operations on workspaces
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

/// Authentication subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Obtain a token and store it in the local cache
    Login {
        /// Use the device code flow even if a client secret is configured
        #[arg(long, conflicts_with = "non_interactive")]
        interactive: bool,

        /// Use the client credentials flow
        #[arg(long)]
        non_interactive: bool,
    },
}

impl AuthCommand {
    /// The explicit flow choice, or `None` to pick one from the configuration.
    pub fn interactive(&self) -> Option<bool> {
        match self {
            AuthCommand::Login {
                interactive: true, ..
            } => Some(true),
            AuthCommand::Login {
                non_interactive: true,
                ..
            } => Some(false),
            AuthCommand::Login { .. } => None,
        }
    }
}

/// Workspace subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum WorkspaceCommand {
    /// Switch to a workspace and store its key in the local cache
    Select {
        /// Workspace to switch to, e.g. `t-abcd1234`
        workspace_id: String,
    },
}

/// Node subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum NodeCommand {
    /// List the nodes of the selected workspace
    List,
}

/// Admin subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommand {
    /// Add an authorization rule to a workspace
    AddAuthRule {
        /// Do not add the rule, only print its JSON representation
        #[arg(short, long)]
        dry_run: bool,

        #[command(subcommand)]
        rule: RuleArgs,
    },

    /// Delete the authorization rule at an index
    DeleteAuthRule {
        /// Workspace to modify
        workspace_id: String,

        /// Index of the rule as shown by `list-auth-rules`
        index: usize,
    },

    /// List the authorization rules of a workspace
    ListAuthRules {
        /// Workspace to inspect
        workspace_id: String,
    },
}

/// Rule variants accepted by `admin add-auth-rule`
#[derive(Subcommand, Debug, Clone)]
pub enum RuleArgs {
    /// Allow users whose email address ends with a domain
    EmailDomain {
        workspace_id: String,

        /// Domain suffix including the `@`, e.g. `@tenzir.com`
        domain: String,

        /// Restrict the rule to one identity provider connection
        #[arg(long)]
        connection: Option<String>,
    },

    /// Allow members of an organization
    OrganizationMembership {
        workspace_id: String,
        organization_claim: String,
        organization: String,

        #[arg(long)]
        connection: Option<String>,
    },

    /// Allow users holding a role in an organization
    OrganizationRole {
        workspace_id: String,
        roles_claim: String,
        role: String,
        organization_claim: String,
        organization: String,

        #[arg(long)]
        connection: Option<String>,
    },

    /// Allow a single user
    User {
        workspace_id: String,
        user_id: String,
    },

    /// Allow every authenticated user
    AllowAll { workspace_id: String },
}

impl RuleArgs {
    /// Splits the arguments into the target workspace and the rule.
    pub fn into_rule(self) -> (String, AuthRule) {
        match self {
            RuleArgs::EmailDomain {
                workspace_id,
                domain,
                connection,
            } => (
                workspace_id,
                AuthRule::EmailDomain {
                    connection,
                    email_domain: domain,
                },
            ),
            RuleArgs::OrganizationMembership {
                workspace_id,
                organization_claim,
                organization,
                connection,
            } => (
                workspace_id,
                AuthRule::OrganizationMembership {
                    connection,
                    organization_claim,
                    organization,
                },
            ),
            RuleArgs::OrganizationRole {
                workspace_id,
                roles_claim,
                role,
                organization_claim,
                organization,
                connection,
            } => (
                workspace_id,
                AuthRule::OrganizationRole {
                    connection,
                    roles_claim,
                    role,
                    organization_claim,
                    organization,
                },
            ),
            RuleArgs::User {
                workspace_id,
                user_id,
            } => (workspace_id, AuthRule::User { user_id }),
            RuleArgs::AllowAll { workspace_id } => (workspace_id, AuthRule::AllowAll),
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
