//! Confinement of user-supplied paths to the project.
//!
//! Every filesystem access driven by request input goes through
//! [`PathGuard::resolve`]. A path is accepted only if it is relative, stays
//! inside the project after lexical normalization, falls under one of the
//! allowed roots, and its real (symlink-resolved) location is still inside
//! the project root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Validates relative paths against a project root and allow-list.
#[derive(Debug, Clone)]
pub struct PathGuard {
    canonical_root: PathBuf,
    allowed_roots: Vec<Vec<String>>,
}

impl PathGuard {
    /// Create a guard for `project_root`.
    ///
    /// Allowed roots are project-relative; `"."` allows the whole project.
    /// An empty list allows nothing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the project root cannot be canonicalized, or
    /// `INVALID_ARGUMENT` if an allowed root is itself absolute or escaping.
    pub fn new(project_root: &Path, allowed_roots: &[String]) -> Result<Self> {
        let canonical_root = project_root.canonicalize()?;
        let allowed_roots = allowed_roots
            .iter()
            .map(|root| {
                normalize(root).ok_or_else(|| {
                    Error::InvalidArgument(format!("allowed root '{root}' must be project-relative"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            canonical_root,
            allowed_roots,
        })
    }

    /// Canonical project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.canonical_root
    }

    /// Resolve a project-relative path to an absolute path.
    ///
    /// The target does not need to exist; for a missing target the deepest
    /// existing ancestor is what gets canonicalized.
    ///
    /// # Errors
    ///
    /// Returns `PATH_OUTSIDE_ROOT` if any check fails and `INVALID_ARGUMENT`
    /// for an empty path.
    pub fn resolve(&self, rel_path: &str) -> Result<PathBuf> {
        if rel_path.trim().is_empty() {
            return Err(Error::InvalidArgument("path must not be empty".to_string()));
        }
        let outside = || Error::PathOutsideRoot {
            path: rel_path.to_string(),
        };

        let segments = normalize(rel_path).ok_or_else(outside)?;
        if !self.is_allowed(&segments) {
            return Err(outside());
        }

        let candidate = segments
            .iter()
            .fold(self.canonical_root.clone(), |acc, s| acc.join(s));
        let real = canonicalize_existing(&candidate)?;
        if !real.starts_with(&self.canonical_root) {
            return Err(outside());
        }

        Ok(candidate)
    }

    /// Project-relative, `/`-separated form of an absolute path.
    ///
    /// Returns `None` for paths outside the project root.
    #[must_use]
    pub fn relative(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.canonical_root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    fn is_allowed(&self, segments: &[String]) -> bool {
        self.allowed_roots
            .iter()
            .any(|root| segments.starts_with(root))
    }
}

/// Lexically normalize a relative path into segments.
///
/// `.` segments are dropped and `..` pops the previous segment. Returns
/// `None` for absolute paths and for paths whose `..` climbs above the
/// starting point.
fn normalize(rel_path: &str) -> Option<Vec<String>> {
    let mut segments: Vec<String> = Vec::new();
    for component in Path::new(rel_path).components() {
        match component {
            Component::Normal(s) => segments.push(s.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                segments.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(segments)
}

/// Canonicalize `path`, or its deepest existing ancestor if it is missing.
fn canonicalize_existing(path: &Path) -> Result<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        match current.canonicalize() {
            Ok(real) => {
                return Ok(missing.iter().rev().fold(real, |acc, s| acc.join(s)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (current.parent(), current.file_name()) else {
                    return Err(Error::Io(e));
                };
                missing.push(name.to_os_string());
                current = parent;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}
