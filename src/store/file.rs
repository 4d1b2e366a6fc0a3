//! Atomic file operations for the record store.
//!
//! - Atomic writes: write to a hidden temp file in the same directory,
//!   sync to disk, then rename over the destination
//! - Record serialization: pretty-printed JSON with sorted keys so record
//!   files diff cleanly

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Suffix of in-flight temp files. Never matches the `.json` record glob.
const TEMP_SUFFIX: &str = ".tmp";

/// Write content to a file atomically.
///
/// 1. Writes content to a temporary file next to `path`
/// 2. Calls `fsync` so the data is on disk
/// 3. Renames the temp file over `path`
///
/// Readers never observe a partially-written file, and if any step fails
/// the previous version (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);

    let written = (|| -> std::io::Result<()> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Hidden, uniquely-named sibling of `path` used as the write target.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let nonce = &uuid::Uuid::new_v4().simple().to_string()[..8];
    path.with_file_name(format!(".{name}.{nonce}{TEMP_SUFFIX}"))
}

/// Serialize a record as pretty JSON with lexicographically sorted keys.
///
/// Going through `serde_json::Value` sorts object keys (the default map is
/// ordered), which makes the output independent of struct field order.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_stable_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    let mut json = serde_json::to_string_pretty(&value)?;
    json.push('\n');
    Ok(json)
}

/// List the `*.json` files directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|e| e == "json")
                && !path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('.'))
        })
        .collect();
    files.sort();
    Ok(files)
}
