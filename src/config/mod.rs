//! Configuration management.
//!
//! Each project keeps its metadata under `<project>/.planmark/`:
//! - `config.json` - plan root, allowed roots, read-only flag, debounce
//! - `annotations/`, `cycles/`, `bundles/`, `revisions/`, `node-meta/` -
//!   one JSON file per record
//!
//! Environment overrides:
//! - `PLANMARK_PLAN_ROOT` - plan root relative to the project
//! - `PLANMARK_READ_ONLY` - any truthy value makes every store read-only
//! - `PLANMARK_ACTOR` - author recorded on new annotations

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::file;

/// Metadata directory name under the project root.
pub const METADATA_DIR: &str = ".planmark";

/// Config file name inside the metadata directory.
pub const CONFIG_FILE: &str = "config.json";

const DEFAULT_PLAN_ROOT: &str = "plan";
const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Per-project settings stored in `.planmark/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Directory of markdown documents, relative to the project root
    pub plan_root: String,

    /// Roots request paths may resolve under. Defaults to the plan root.
    /// An explicitly empty list allows nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_roots: Option<Vec<String>>,

    pub read_only: bool,

    /// Quiet period before a batch of file changes is reindexed
    pub debounce_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            plan_root: DEFAULT_PLAN_ROOT.to_string(),
            allowed_roots: None,
            read_only: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl ProjectConfig {
    /// Load the config for `project_root`, then apply environment overrides.
    ///
    /// A missing config file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file exists but is not valid.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = config_path(project_root);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Self>(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(Error::Io(e)),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Write the config to `<project>/.planmark/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, project_root: &Path) -> Result<()> {
        let json = file::to_stable_json(self)?;
        file::atomic_write(&config_path(project_root), json.as_bytes())?;
        Ok(())
    }

    /// Allowed roots after defaulting.
    #[must_use]
    pub fn effective_allowed_roots(&self) -> Vec<String> {
        self.allowed_roots
            .clone()
            .unwrap_or_else(|| vec![self.plan_root.clone()])
    }

    fn apply_env(&mut self) {
        if let Ok(root) = std::env::var("PLANMARK_PLAN_ROOT")
            && !root.trim().is_empty()
        {
            self.plan_root = root.trim().to_string();
        }
        if let Ok(flag) = std::env::var("PLANMARK_READ_ONLY")
            && is_truthy(&flag)
        {
            self.read_only = true;
        }
    }

    /// Check the settings that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty or absolute plan root.
    pub fn validate(&self) -> Result<()> {
        let root = self.plan_root.trim();
        if root.is_empty() {
            return Err(Error::Config("planRoot must not be empty".to_string()));
        }
        if Path::new(root).is_absolute() {
            return Err(Error::Config(format!(
                "planRoot must be relative to the project, got '{root}'"
            )));
        }
        Ok(())
    }
}

/// `<project>/.planmark`
#[must_use]
pub fn metadata_dir(project_root: &Path) -> PathBuf {
    project_root.join(METADATA_DIR)
}

/// `<project>/.planmark/config.json`
#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    metadata_dir(project_root).join(CONFIG_FILE)
}

/// Whether an environment flag value means "on".
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Discover the project root from the current directory.
///
/// Resolution strategy:
/// 1. The **git root**, if it has a `.planmark/` directory. Keeps a stray
///    metadata dir in a subdirectory from shadowing the real project.
/// 2. Walk up from the current directory.
#[must_use]
pub fn discover_project_root() -> Option<PathBuf> {
    if let Some(git_root) = git_toplevel()
        && metadata_dir(&git_root).is_dir()
    {
        return Some(git_root);
    }

    std::env::current_dir()
        .ok()
        .and_then(|cwd| discover_project_root_from(&cwd))
}

/// Walk up from `start` to the first directory containing `.planmark/`.
#[must_use]
pub fn discover_project_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| metadata_dir(dir).is_dir())
        .map(Path::to_path_buf)
}

/// Get the git repository root directory.
#[must_use]
pub fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `PLANMARK_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("PLANMARK_ACTOR")
        && !actor.is_empty()
    {
        return actor;
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
        && output.status.success()
    {
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}
