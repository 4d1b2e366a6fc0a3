//! planmark - annotate markdown plans with anchors that survive edits
//!
//! This crate provides the core functionality for the `pm` CLI tool.
//!
//! # Architecture
//!
//! - [`index`] - Markdown heading scanner and document catalog
//! - [`anchor`] - Quote-anchor resolution
//! - [`store`] - One-JSON-file-per-record stores
//! - [`watch`] - Filesystem watch, single-flight reindexing
//! - [`events`] - Change-event bus and subscriber fan-out
//! - [`path_guard`] - Confines request paths to the allowed roots
//! - [`context`] - Explicit application context
//! - [`service`] - Request-level operations
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Configuration management
//! - [`model`] - Data types (Heading, AnchorV1, Annotation, Cycle, ...)
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod anchor;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod index;
pub mod model;
pub mod path_guard;
pub mod service;
pub mod store;
pub mod validate;
pub mod watch;

pub use error::{Error, Result};
