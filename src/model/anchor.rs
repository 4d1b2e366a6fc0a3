//! Anchors: where in a document an annotation attaches.

use serde::{Deserialize, Serialize};

/// Anchor strategies. Only quote anchors exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStrategy {
    #[default]
    Quote,
}

/// A quote anchor: literal text, optionally narrowed by a containing section
/// and by the text immediately around it.
///
/// Deliberately holds no offsets, so it survives edits that leave the quoted
/// text in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorV1 {
    pub strategy: AnchorStrategy,
    pub quote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

impl AnchorV1 {
    /// A bare quote anchor with no hints.
    #[must_use]
    pub fn quote(quote: impl Into<String>) -> Self {
        Self {
            strategy: AnchorStrategy::Quote,
            quote: quote.into(),
            prefix: None,
            suffix: None,
            section_id: None,
        }
    }

    #[must_use]
    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

/// Result of relocating an anchor. Failures are data, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnchorMatch {
    Ok { start: usize, end: usize },
    Missing,
    Ambiguous { candidates: usize },
}

impl AnchorMatch {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The matched byte range, if resolved.
    #[must_use]
    pub const fn range(&self) -> Option<(usize, usize)> {
        match self {
            Self::Ok { start, end } => Some((*start, *end)),
            Self::Missing | Self::Ambiguous { .. } => None,
        }
    }
}

/// What an annotation is attached to.
///
/// Section references are weak: the heading may disappear after a reindex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnnotationTarget {
    File,
    Section {
        #[serde(rename = "sectionId")]
        section_id: String,
    },
    Selection {
        quote: String,
        #[serde(rename = "anchorV1")]
        anchor_v1: AnchorV1,
        #[serde(
            rename = "sectionIdHint",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        section_id_hint: Option<String>,
    },
}

impl AnnotationTarget {
    /// Selection target from an anchor; the quote mirrors the anchor's.
    #[must_use]
    pub fn selection(anchor: AnchorV1) -> Self {
        Self::Selection {
            quote: anchor.quote.clone(),
            section_id_hint: anchor.section_id.clone(),
            anchor_v1: anchor,
        }
    }

    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Section { .. } => "section",
            Self::Selection { .. } => "selection",
        }
    }
}
