//! Error types for planmark.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`) shared with the route layer
//! - Category-based exit codes for the CLI
//! - Context-aware recovery hints
//! - The `{ok:false, error:{code, message, details?}}` envelope
//!
//! Anchor resolution failures are not errors: `missing` and `ambiguous` are
//! returned as [`crate::model::AnchorMatch`] values.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::RecordKind;
use crate::validate::ValidationError;

/// Result type alias for planmark operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based exit
/// code. Clients match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    PathOutsideRoot,
    PlanRootMissing,
    Locked,
    ReadOnly,
    AnchorAmbiguous,
    SchemaMigrationRequired,
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::PathOutsideRoot => "PATH_OUTSIDE_ROOT",
            Self::PlanRootMissing => "PLAN_ROOT_MISSING",
            Self::Locked => "LOCKED",
            Self::ReadOnly => "READ_ONLY",
            Self::AnchorAmbiguous => "ANCHOR_AMBIGUOUS",
            Self::SchemaMigrationRequired => "SCHEMA_MIGRATION_REQUIRED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-7).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::PlanRootMissing | Self::SchemaMigrationRequired => 2,
            Self::NotFound => 3,
            Self::InvalidArgument | Self::AnchorAmbiguous => 4,
            Self::PathOutsideRoot => 5,
            Self::Locked | Self::ReadOnly => 6,
        }
    }

    /// Whether a client should retry with corrected input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidArgument | Self::AnchorAmbiguous)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in planmark operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid {kind} record: {source}")]
    InvalidRecord {
        kind: RecordKind,
        #[source]
        source: ValidationError,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("{kind} not found: {id} (did you mean: {}?)", similar.join(", "))]
    NotFoundSimilar {
        kind: RecordKind,
        id: String,
        similar: Vec<String>,
    },

    #[error("Document not found: {path}")]
    DocumentNotFound { path: String },

    #[error("Path is outside the allowed roots: {path}")]
    PathOutsideRoot { path: String },

    #[error("Plan root does not exist: {}", path.display())]
    PlanRootMissing { path: PathBuf },

    #[error("Locked: {0}")]
    Locked(String),

    #[error("Project is read-only")]
    ReadOnly,

    #[error("Anchor quote matches {candidates} locations")]
    AnchorAmbiguous { candidates: usize },

    #[error("{kind} {id} has schema version {found}, this build supports {supported}")]
    SchemaMigrationRequired {
        kind: RecordKind,
        id: String,
        found: u32,
        supported: u32,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) | Self::InvalidRecord { .. } | Self::Json(_) => {
                ErrorCode::InvalidArgument
            }
            Self::NotFound { .. } | Self::NotFoundSimilar { .. } | Self::DocumentNotFound { .. } => {
                ErrorCode::NotFound
            }
            Self::PathOutsideRoot { .. } => ErrorCode::PathOutsideRoot,
            Self::PlanRootMissing { .. } => ErrorCode::PlanRootMissing,
            Self::Locked(_) => ErrorCode::Locked,
            Self::ReadOnly => ErrorCode::ReadOnly,
            Self::AnchorAmbiguous { .. } => ErrorCode::AnchorAmbiguous,
            Self::SchemaMigrationRequired { .. } => ErrorCode::SchemaMigrationRequired,
            Self::Config(_) | Self::Io(_) | Self::Watch(_) | Self::Other(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotFound { kind, id } => Some(format!(
                "No {kind} with ID '{id}'. Use `pm {} list` to see what exists.",
                kind.command()
            )),
            Self::NotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }
            Self::PathOutsideRoot { .. } => Some(
                "Paths are relative to the project root and must stay inside an allowed root \
                 (see `allowedRoots` in .planmark/config.json)"
                    .to_string(),
            ),
            Self::PlanRootMissing { path } => Some(format!(
                "Create {} or set `planRoot` in .planmark/config.json",
                path.display()
            )),
            Self::ReadOnly => Some(
                "Unset PLANMARK_READ_ONLY or set `readOnly: false` in .planmark/config.json"
                    .to_string(),
            ),
            Self::AnchorAmbiguous { .. } => Some(
                "Pass --section, --prefix or --suffix to narrow the quote to one location"
                    .to_string(),
            ),
            Self::SchemaMigrationRequired { .. } => {
                Some("The record was written by a newer planmark; upgrade to read it".to_string())
            }
            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: open, in_progress, blocked, done, archived. \
                         Synonyms: wip→in_progress, todo→open, closed→done"
                            .to_string(),
                    )
                } else if msg.contains("priority") {
                    Some("Valid priorities: low, medium, high, critical (or P0-P3)".to_string())
                } else {
                    None
                }
            }
            Self::InvalidRecord { .. }
            | Self::DocumentNotFound { .. }
            | Self::Locked(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Watch(_)
            | Self::Other(_) => None,
        }
    }

    /// Machine-readable details attached to the envelope, if any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { kind, id } => Some(serde_json::json!({
                "kind": kind.as_str(),
                "id": id,
            })),
            Self::NotFoundSimilar { kind, id, similar } => Some(serde_json::json!({
                "kind": kind.as_str(),
                "id": id,
                "similar": similar,
            })),
            Self::DocumentNotFound { path } | Self::PathOutsideRoot { path } => {
                Some(serde_json::json!({ "path": path }))
            }
            Self::PlanRootMissing { path } => {
                Some(serde_json::json!({ "path": path.display().to_string() }))
            }
            Self::AnchorAmbiguous { candidates } => {
                Some(serde_json::json!({ "candidates": candidates }))
            }
            Self::SchemaMigrationRequired {
                kind,
                id,
                found,
                supported,
            } => Some(serde_json::json!({
                "kind": kind.as_str(),
                "id": id,
                "found": found,
                "supported": supported,
            })),
            Self::InvalidRecord { kind, source } => Some(serde_json::json!({
                "kind": kind.as_str(),
                "field": source.field,
            })),
            _ => None,
        }
    }

    /// The error envelope consumed by the route layer.
    ///
    /// `{ok:false, error:{code, message, details?}}`
    #[must_use]
    pub fn to_envelope(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "ok": false,
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
            }
        });

        if let Some(details) = self.details() {
            obj["error"]["details"] = details;
        }

        obj
    }

    /// Envelope plus CLI-only fields (exit code, retryability, hint).
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = self.to_envelope();
        obj["error"]["retryable"] = serde_json::Value::Bool(code.is_retryable());
        obj["error"]["exit_code"] = serde_json::Value::from(code.exit_code());

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
