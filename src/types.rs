//! Core types for offramp-preview

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FetchError;

/// Canonical identifier of the document being previewed
///
/// The only way to obtain a `SourceKey` is through the normalizer
/// ([`SourceKey::parse`] or [`normalize_with_scheme`](crate::source_key::normalize_with_scheme)),
/// so two keys compare equal exactly when they name the same document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    /// Wrap an already-normalized string
    pub(crate) fn from_normalized(value: String) -> Self {
        Self(value)
    }

    /// Get the canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host component of the key, used to derive export filenames
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Named rendering style applied to a source document
///
/// This is a closed set. Every `match` on it is exhaustive, so adding or removing
/// a theme is a compile-time-checked change; the orchestration code only ever
/// iterates [`VariantId::ALL`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VariantId {
    /// Clean, minimalist layout
    Modern,
    /// Monospaced, code-focused layout
    Matrix,
    /// Retro news-feed layout
    Drudge,
    /// Soft, journal-like layout
    Ghibli,
}

/// Display metadata for a variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VariantInfo {
    /// Human-readable name
    pub name: &'static str,
    /// One-line description shown next to the theme picker
    pub description: &'static str,
}

impl VariantId {
    /// Every variant, in enumeration order
    pub const ALL: [VariantId; 4] = [
        VariantId::Modern,
        VariantId::Matrix,
        VariantId::Drudge,
        VariantId::Ghibli,
    ];

    /// Lowercase identifier used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            VariantId::Modern => "modern",
            VariantId::Matrix => "matrix",
            VariantId::Drudge => "drudge",
            VariantId::Ghibli => "ghibli",
        }
    }

    /// Display name and description
    pub fn info(self) -> VariantInfo {
        match self {
            VariantId::Modern => VariantInfo {
                name: "Modern",
                description: "Clean, minimalist design with focus on readability. \
                              Perfect for most blogs and articles.",
            },
            VariantId::Matrix => VariantInfo {
                name: "Matrix",
                description: "Monospaced, code-focused, minimal decoration.",
            },
            VariantId::Drudge => VariantInfo {
                name: "Drudge",
                description: "Retro news feed style with emphasis on headlines.",
            },
            VariantId::Ghibli => VariantInfo {
                name: "Ghibli",
                description: "Whimsical and soft, like a journal entry.",
            },
        }
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VariantId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantId::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::error::Error::validation(format!("unknown variant '{s}'")))
    }
}

/// One variant of the source document as produced by the transform service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    /// Document title
    pub title: String,
    /// Author display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Publication date as reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Untransformed source content (HTML)
    pub raw_content: String,
    /// Transformed content (markdown with optional front-matter)
    pub transformed_content: String,
}

/// Lifecycle state of one variant for the current source key
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum VariantState {
    /// Nothing requested yet
    #[default]
    Unrequested,
    /// A fetch is in flight
    Pending,
    /// Fetched successfully
    Loaded(PreviewPayload),
    /// Last fetch failed; can be retried
    Failed(FetchError),
}

impl VariantState {
    /// Short lowercase label used in logs, errors and UI summaries
    pub fn label(&self) -> &'static str {
        match self {
            VariantState::Unrequested => "unrequested",
            VariantState::Pending => "pending",
            VariantState::Loaded(_) => "loaded",
            VariantState::Failed(_) => "failed",
        }
    }

    /// Whether the state is `Loaded`
    pub fn is_loaded(&self) -> bool {
        matches!(self, VariantState::Loaded(_))
    }

    /// Whether the state is `Failed`
    pub fn is_failed(&self) -> bool {
        matches!(self, VariantState::Failed(_))
    }
}

/// Monotonic counter distinguishing successive batches
///
/// Only [`PreviewCache::reset`](crate::cache::PreviewCache::reset) hands out new
/// generations; callers can compare and display them but not make one up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value
    pub fn get(self) -> u64 {
        self.0
    }

    /// The generation following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which representation of the active variant is shown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Untransformed source content
    Raw,
    /// Transformed content
    #[default]
    Transformed,
}

/// Result of a settled batch that committed to the cache
#[derive(Clone, Debug)]
pub struct BatchReport {
    /// Source key the batch ran against
    pub key: SourceKey,
    /// Generation of the batch
    pub generation: Generation,
    /// Variants that loaded, in enumeration order
    pub loaded: Vec<VariantId>,
    /// Variants that failed, with their errors
    pub failed: BTreeMap<VariantId, FetchError>,
    /// Initial active variant
    pub active: VariantId,
    /// When the batch was committed
    pub settled_at: DateTime<Utc>,
}

impl BatchReport {
    /// Whether some (but not all) variants failed
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Outcome of [`Previewer::submit_source`](crate::Previewer::submit_source)
#[derive(Clone, Debug)]
pub enum BatchOutcome {
    /// The batch committed and at least one variant loaded
    Complete(BatchReport),
    /// A newer batch started before this one settled; nothing was committed
    Superseded {
        /// Source key of the superseded batch
        key: SourceKey,
        /// Generation of the superseded batch
        generation: Generation,
    },
}

/// Per-variant state summary for UI rendering
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariantSummary {
    /// The variant
    pub variant: VariantId,
    /// State label ("unrequested", "pending", "loaded", "failed")
    pub state: &'static str,
    /// Error message when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the variant can be retried
    pub retryable: bool,
}

/// Event emitted during the preview lifecycle
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A batch started for a new source key
    BatchStarted {
        /// Source key
        key: SourceKey,
        /// Batch generation
        generation: Generation,
    },

    /// A variant loaded (batch or retry)
    VariantLoaded {
        /// Source key
        key: SourceKey,
        /// Variant
        variant: VariantId,
    },

    /// A variant failed (batch or retry)
    VariantFailed {
        /// Source key
        key: SourceKey,
        /// Variant
        variant: VariantId,
        /// Classified failure
        error: FetchError,
    },

    /// A batch committed its results
    BatchSettled {
        /// Source key
        key: SourceKey,
        /// Batch generation
        generation: Generation,
        /// Variants that loaded
        loaded: Vec<VariantId>,
        /// Variants that failed
        failed: Vec<VariantId>,
    },

    /// A batch settled after being superseded; its results were dropped
    BatchSuperseded {
        /// Source key of the superseded batch
        key: SourceKey,
        /// Generation of the superseded batch
        generation: Generation,
    },

    /// Every variant of a batch failed
    AllVariantsFailed {
        /// Source key
        key: SourceKey,
    },

    /// A retry of a failed variant started
    RetryStarted {
        /// Source key
        key: SourceKey,
        /// Variant
        variant: VariantId,
    },

    /// The active variant changed
    ActiveVariantChanged {
        /// Source key
        key: SourceKey,
        /// New active variant
        variant: VariantId,
    },

    /// The display mode changed
    DisplayModeChanged {
        /// New display mode
        mode: DisplayMode,
    },

    /// An export started
    ExportStarted {
        /// Source key
        key: SourceKey,
        /// Exported variant
        variant: VariantId,
    },

    /// The packager produced a bundle
    ExportComplete {
        /// Source key
        key: SourceKey,
        /// Exported variant
        variant: VariantId,
        /// Suggested filename of the bundle
        filename: String,
    },

    /// The packager failed
    ExportFailed {
        /// Source key
        key: SourceKey,
        /// Variant
        variant: VariantId,
        /// Error message
        error: String,
    },
}
