//! Initialize a planmark project.
//!
//! Creates `.planmark/` in the current directory with a `config.json` and a
//! `.gitignore` for in-flight temp files, plus the plan root if it does not
//! exist yet. Records under `.planmark/` are meant to be committed.

use crate::config::{self, ProjectConfig};
use crate::error::{Error, Result};
use crate::store::file;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const GITIGNORE: &str = "# In-flight atomic writes\n.*.tmp\n";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitOutput {
    path: PathBuf,
    plan_root: PathBuf,
    created_plan_root: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `INVALID_ARGUMENT` if the project is already initialized and
/// `force` is not set, or an error if files cannot be written.
pub fn execute(explicit_root: Option<&Path>, plan_root: &str, force: bool, json: bool) -> Result<()> {
    let project_root = match explicit_root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let output = init_project(&project_root, plan_root, force)?;

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized planmark in {}", output.path.display());
        if output.created_plan_root {
            println!("  Created plan root: {}", output.plan_root.display());
        } else {
            println!("  Plan root: {}", output.plan_root.display());
        }
        println!();
        println!("Next: run 'pm index' to index your plan documents.");
    }

    Ok(())
}

fn init_project(project_root: &Path, plan_root: &str, force: bool) -> Result<InitOutput> {
    let meta_dir = config::metadata_dir(project_root);
    let config_path = config::config_path(project_root);
    if config_path.exists() && !force {
        return Err(Error::InvalidArgument(format!(
            "already initialized: {} exists (use --force to overwrite)",
            config_path.display()
        )));
    }

    let config = ProjectConfig {
        plan_root: plan_root.trim().to_string(),
        ..ProjectConfig::default()
    };
    config.validate()?;
    config.save(project_root)?;

    let gitignore = meta_dir.join(".gitignore");
    if !gitignore.exists() || force {
        file::atomic_write(&gitignore, GITIGNORE.as_bytes())?;
    }

    let plan_dir = project_root.join(&config.plan_root);
    let created_plan_root = !plan_dir.is_dir();
    if created_plan_root {
        fs::create_dir_all(&plan_dir)?;
    }

    Ok(InitOutput {
        path: meta_dir,
        plan_root: plan_dir,
        created_plan_root,
    })
}
