/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `auth`      - log in and cache a token
- `workspace` - select the workspace for user-scoped requests
- `node`      - list the nodes of the selected workspace
- `admin`     - manage workspace authorization rules

The handlers obtain a validated token through the token manager and use the
request client for everything else.
*/

use anyhow::{Context, Result};

use crate::auth::cache::{TokenCache, WorkspaceSelection};
use crate::auth::manager::TokenManager;
use crate::auth::validator::ValidToken;
use crate::client::{build_http_client, AppClient};
use crate::config::PlatformEnvironment;

/// Performs discovery and returns a manager for the configured stage.
pub async fn token_manager(config: &PlatformEnvironment) -> Result<TokenManager> {
    let http = build_http_client(config)?;
    let cache = TokenCache::for_environment(config)?;
    TokenManager::discover(http, config, cache)
        .await
        .context("while discovering the OIDC provider")
}

/// Obtains a token and returns a client logged in to the admin API.
pub async fn connect_and_login(
    config: &PlatformEnvironment,
    interactive: Option<bool>,
) -> Result<(AppClient, ValidToken)> {
    let manager = token_manager(config).await?;
    let token = manager
        .obtain_valid_token(interactive)
        .await
        .context("while obtaining an identity token")?;
    let mut client = AppClient::new(config)?;
    client.user_login(token.token.clone());
    Ok((client, token))
}

/// Returns a client logged in to the user API of the selected workspace.
pub fn workspace_client(
    config: &PlatformEnvironment,
    cache: &TokenCache,
) -> Result<(AppClient, WorkspaceSelection)> {
    let selection = cache.load_workspace().context(
        "while loading the current workspace, run 'tenzir-platform workspace select' first",
    )?;
    let mut client = AppClient::new(config)?;
    client.workspace_login(selection.user_key.clone());
    Ok((client, selection))
}

// Login command handler
pub mod auth {
    //! `auth login`
    //!
    //! Obtains a token through the precedence policy of the token manager and
    //! reports the authenticated user.

    use super::*;

    /// Logs in and prints the user id of the token.
    ///
    /// # Arguments
    ///
    /// * `config` - Environment configuration
    /// * `interactive` - Forces the device flow (`Some(true)`) or the client
    ///   credentials flow (`Some(false)`); `None` picks one from the
    ///   configuration
    pub async fn login(config: &PlatformEnvironment, interactive: Option<bool>) -> Result<()> {
        let manager = token_manager(config).await?;
        let token = login_with(&manager, interactive).await?;
        tracing::debug!(expires_at = ?token.identity.expires_at(), "token is valid");
        println!("Logged in as {}", token.identity.user_id());
        Ok(())
    }

    /// Runs the login against an existing manager.
    pub async fn login_with(
        manager: &TokenManager,
        interactive: Option<bool>,
    ) -> Result<ValidToken> {
        tracing::info!(?interactive, "logging in");
        manager
            .obtain_valid_token(interactive)
            .await
            .context("while logging in")
    }
}

// Workspace command handlers
pub mod workspace {
    //! `workspace select`

    use serde::Deserialize;

    use super::*;
    use crate::client::{error_for_status, TargetApi};

    #[derive(Debug, Deserialize)]
    struct SwitchTenantResponse {
        user_key: String,
    }

    /// Exchanges `id_token` for the user key of `workspace_id` and stores the
    /// selection in `cache`.
    pub async fn select(
        client: &AppClient,
        cache: &TokenCache,
        id_token: &str,
        workspace_id: &str,
    ) -> Result<WorkspaceSelection> {
        let payload = serde_json::json!({
            "id_token": id_token,
            "tenant_id": workspace_id,
        });
        let resp = client
            .post("switch-tenant", &payload, TargetApi::UserPublic, 0)
            .await?;
        let SwitchTenantResponse { user_key } = error_for_status(resp)
            .await
            .with_context(|| format!("while switching to workspace {workspace_id}"))?
            .json()
            .await
            .context("while parsing the workspace key")?;

        let selection = WorkspaceSelection {
            workspace_id: workspace_id.to_string(),
            user_key,
        };
        cache.store_workspace(&selection)?;
        Ok(selection)
    }

    /// Entry point for `workspace select`.
    pub async fn run_select(config: &PlatformEnvironment, workspace_id: &str) -> Result<()> {
        let (client, token) = connect_and_login(config, None).await?;
        let cache = TokenCache::for_environment(config)?;
        select(&client, &cache, &token.token, workspace_id).await?;
        println!("Switched to workspace {workspace_id}");
        Ok(())
    }
}

// Node command handlers
pub mod node {
    //! `node list`

    use super::*;
    use crate::client::{error_for_status, TargetApi};

    /// Fetches the nodes of the selected workspace.
    pub async fn list_nodes(client: &AppClient, workspace_id: &str) -> Result<serde_json::Value> {
        let payload = serde_json::json!({ "tenant_id": workspace_id });
        let resp = client
            .post("list-nodes", &payload, TargetApi::User, 0)
            .await?;
        let mut body: serde_json::Value = error_for_status(resp)
            .await
            .with_context(|| format!("while listing the nodes of workspace {workspace_id}"))?
            .json()
            .await
            .context("while parsing the node list")?;
        Ok(body["nodes"].take())
    }

    /// Entry point for `node list`.
    pub async fn run_list(config: &PlatformEnvironment) -> Result<()> {
        let cache = TokenCache::for_environment(config)?;
        let (client, selection) = workspace_client(config, &cache)?;
        let nodes = list_nodes(&client, &selection.workspace_id).await?;
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        Ok(())
    }
}

// Admin command handlers
pub mod admin {
    //! `admin add-auth-rule`, `admin delete-auth-rule`, `admin list-auth-rules`

    use super::*;
    use crate::auth_rule::AuthRule;
    use crate::client::{error_for_status, TargetApi};

    /// Submits `rule` for `workspace_id`.
    pub async fn add_auth_rule(
        client: &AppClient,
        workspace_id: &str,
        rule: &AuthRule,
    ) -> Result<()> {
        let resp = client
            .post(
                "add-auth-function",
                &rule.add_payload(workspace_id),
                TargetApi::Admin,
                0,
            )
            .await?;
        error_for_status(resp)
            .await
            .with_context(|| format!("while adding an auth rule to workspace {workspace_id}"))?;
        tracing::info!(workspace_id, kind = rule.kind(), "added auth rule");
        Ok(())
    }

    /// Deletes the rule at `index` of `workspace_id`.
    pub async fn delete_auth_rule(
        client: &AppClient,
        workspace_id: &str,
        index: usize,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "tenant_id": workspace_id,
            "index": index,
        });
        let resp = client
            .post("delete-auth-function", &payload, TargetApi::Admin, 0)
            .await?;
        error_for_status(resp).await.with_context(|| {
            format!("while deleting auth rule {index} of workspace {workspace_id}")
        })?;
        Ok(())
    }

    /// Fetches the rules of `workspace_id` as reported by the platform.
    pub async fn list_auth_rules(
        client: &AppClient,
        workspace_id: &str,
    ) -> Result<serde_json::Value> {
        let resp = client.get("global-tenant-list", TargetApi::Admin, 0).await?;
        let workspaces: Vec<serde_json::Value> = error_for_status(resp)
            .await
            .context("while listing workspaces")?
            .json()
            .await
            .context("while parsing the workspace list")?;

        workspaces
            .into_iter()
            .find(|workspace| workspace["id"] == workspace_id)
            .map(|mut workspace| workspace["auth_functions"].take())
            .with_context(|| format!("workspace {workspace_id} not found"))
    }

    /// Entry point for `admin add-auth-rule`.
    pub async fn run_add(
        config: &PlatformEnvironment,
        workspace_id: &str,
        rule: AuthRule,
        dry_run: bool,
    ) -> Result<()> {
        let json = serde_json::to_string(&rule)?;
        if dry_run {
            println!("Would add rule {json}");
            return Ok(());
        }
        let (client, _) = connect_and_login(config, None).await?;
        add_auth_rule(&client, workspace_id, &rule).await?;
        println!("Added {json}");
        Ok(())
    }

    /// Entry point for `admin delete-auth-rule`.
    pub async fn run_delete(
        config: &PlatformEnvironment,
        workspace_id: &str,
        index: usize,
    ) -> Result<()> {
        let (client, _) = connect_and_login(config, None).await?;
        delete_auth_rule(&client, workspace_id, index).await?;
        println!("Deleted auth function {index} of workspace {workspace_id}");
        Ok(())
    }

    /// Entry point for `admin list-auth-rules`.
    pub async fn run_list(config: &PlatformEnvironment, workspace_id: &str) -> Result<()> {
        let (client, _) = connect_and_login(config, None).await?;
        let rules = list_auth_rules(&client, workspace_id).await?;
        println!("{}", serde_json::to_string_pretty(&rules)?);
        Ok(())
    }
}
