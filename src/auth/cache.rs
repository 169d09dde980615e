//! On-disk token cache
//!
//! The last obtained token is kept as a plain UTF-8 file at
//! `<cache-root>/tenzir-platform/<stage>/id_token`. The cache root is
//! `$XDG_CACHE_HOME` when set and the platform's user cache directory
//! otherwise. Loading never validates: callers must run the token through
//! the validator before trusting it.
//!
//! The cache assumes a single user running one CLI process at a time; there
//! is no file locking.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::PlatformEnvironment;
use crate::error::{PlatformError, Result};

/// Directory below the cache root owned by this application
pub const CACHE_NAMESPACE: &str = "tenzir-platform";

/// File name of the cached token
const TOKEN_FILE: &str = "id_token";

/// File name of the selected workspace
const WORKSPACE_FILE: &str = "workspace";

/// Returns the cache root: `$XDG_CACHE_HOME` if set, else the platform's
/// user cache directory.
pub fn default_cache_root() -> Option<PathBuf> {
    std::env::var_os("XDG_CACHE_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| directories::BaseDirs::new().map(|dirs| dirs.cache_dir().to_path_buf()))
}

/// The workspace selected with `workspace select`, together with its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSelection {
    /// Identifier of the workspace.
    pub workspace_id: String,

    /// Key authorizing user-scoped API calls for this workspace.
    pub user_key: String,
}

/// Per-environment file cache.
///
/// # Examples
///
/// ```
/// use tenzir_platform::auth::cache::TokenCache;
///
/// let root = tempfile::tempdir().unwrap();
/// let cache = TokenCache::new(root.path(), "dev");
///
/// assert!(cache.load().is_none());
/// cache.store("eyJhbGciOi...").unwrap();
/// assert_eq!(cache.load().as_deref(), Some("eyJhbGciOi..."));
/// ```
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    /// Creates a cache below `cache_root` for the given stage.
    pub fn new(cache_root: impl AsRef<Path>, stage_identifier: &str) -> Self {
        Self {
            dir: cache_root
                .as_ref()
                .join(CACHE_NAMESPACE)
                .join(stage_identifier),
        }
    }

    /// Creates the cache for the configured stage below the default root.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Config`] if no cache directory can be
    /// determined for the current user.
    pub fn for_environment(config: &PlatformEnvironment) -> Result<Self> {
        let root = default_cache_root().ok_or_else(|| {
            PlatformError::Config(
                "cannot determine a cache directory; set XDG_CACHE_HOME".to_string(),
            )
        })?;
        Ok(Self::new(root, &config.stage_identifier))
    }

    /// Path of the cached token.
    pub fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Path of the cached workspace selection.
    pub fn workspace_path(&self) -> PathBuf {
        self.dir.join(WORKSPACE_FILE)
    }

    /// Writes `token` verbatim, replacing any previous value.
    pub fn store(&self, token: &str) -> Result<()> {
        let path = self.token_path();
        tracing::info!(path = %path.display(), "saving token");
        self.write(&path, token)
    }

    /// Reads the cached token.
    ///
    /// A missing file or any read error is a cache miss.
    pub fn load(&self) -> Option<String> {
        let path = self.token_path();
        match std::fs::read_to_string(&path) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no cached token");
                None
            }
        }
    }

    /// Persists the selected workspace.
    pub fn store_workspace(&self, selection: &WorkspaceSelection) -> Result<()> {
        let path = self.workspace_path();
        tracing::debug!(path = %path.display(), "saving workspace id");
        let content = serde_json::to_string(selection)?;
        self.write(&path, &content)
    }

    /// Loads the selected workspace.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Io`] if no workspace was selected yet and
    /// [`PlatformError::Serialization`] if the file is corrupt.
    pub fn load_workspace(&self) -> Result<WorkspaceSelection> {
        let content = std::fs::read_to_string(self.workspace_path())?;
        Ok(serde_json::from_str(content.trim_end())?)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
