//! Data models for planmark.
//!
//! This module contains all domain models:
//! - Heading / IndexedFile (document index output)
//! - AnchorV1 / AnchorMatch / AnnotationTarget
//! - Annotation, Cycle, Bundle, Revision, NodeMeta (persisted records)

pub mod anchor;
pub mod annotation;
pub mod bundle;
pub mod cycle;
pub mod heading;
pub mod node_meta;
pub mod record;
pub mod revision;

pub use anchor::{AnchorMatch, AnchorStrategy, AnchorV1, AnnotationTarget};
pub use annotation::{Annotation, AnnotationKind, AnnotationStatus, Priority, WorkLink};
pub use bundle::{Bundle, BundleFormat};
pub use cycle::{Cycle, CycleStatus};
pub use heading::{Heading, IndexedFile};
pub use node_meta::NodeMeta;
pub use record::{RecordKind, RecordMeta};
pub use revision::{CommitInfo, Revision};
