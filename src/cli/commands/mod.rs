//! Command implementations.

pub mod annotate;
pub mod completions;
pub mod cycle;
pub mod index;
pub mod init;
pub mod node;
pub mod resolve;
pub mod watch;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config;
use crate::context::AppContext;
use crate::error::Result;

/// Resolve the project root: explicit flag, discovered `.planmark/`, git
/// top-level, then the working directory.
///
/// # Errors
///
/// Returns an I/O error if the working directory is unavailable.
pub fn resolve_project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(root) = config::discover_project_root() {
        return Ok(root);
    }
    if let Some(root) = config::git_toplevel() {
        return Ok(root);
    }
    Ok(std::env::current_dir()?)
}

/// Build the context for a command.
///
/// # Errors
///
/// Returns an error if the root cannot be resolved or the config is invalid.
pub fn open_context(explicit: Option<&Path>) -> Result<AppContext> {
    let root = resolve_project_root(explicit)?;
    AppContext::init(&root)
}

/// Print a value as one line of JSON.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Shorten `text` to `max` characters for table output.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let single_line = text.lines().next().unwrap_or_default();
    if single_line.chars().count() > max {
        let cut: String = single_line.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else if single_line.len() < text.len() {
        format!("{single_line}...")
    } else {
        single_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer line of text", 10), "a longe...");
        assert_eq!(truncate("first\nsecond", 20), "first...");
        assert_eq!(truncate("ünïcödé text", 6), "ünï...");
    }

    #[test]
    fn test_explicit_root_wins() {
        let root = resolve_project_root(Some(Path::new("/tmp/somewhere"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/somewhere"));
    }
}
