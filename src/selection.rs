//! Selection state machine
//!
//! Tracks which variant is displayed and how. The phase only ever moves along
//! these edges:
//!
//! ```text
//! Idle ──submit──▶ AwaitingBatch ──≥1 loaded──▶ Ready ◀──retry loads──┐
//!   ▲                  │  ▲                        │                   │
//!   │                  │  └────────submit──────────┘                   │
//!   │                  └──────0 loaded──────▶ AllFailed ───────────────┘
//! ```
//!
//! Phase data never outlives its source key: every transition into
//! `AwaitingBatch` drops the previous active variant and any pending selection.

use serde::Serialize;

use crate::extract::{Extracted, extract};
use crate::previewer::RetryHandle;
use crate::types::{DisplayMode, Generation, PreviewPayload, SourceKey, VariantId, VariantSummary};

/// Where the preview is in its lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SelectionPhase {
    /// Nothing submitted yet
    #[default]
    Idle,
    /// A batch is in flight for `key`
    AwaitingBatch {
        /// Key the batch is running against
        key: SourceKey,
    },
    /// At least one variant is loaded and one of them is active
    Ready {
        /// Current source key
        key: SourceKey,
        /// Active variant
        active: VariantId,
    },
    /// Every variant of the last batch failed
    AllFailed {
        /// Key of the failed batch
        key: SourceKey,
    },
}

impl SelectionPhase {
    /// Source key the phase refers to
    pub fn key(&self) -> Option<&SourceKey> {
        match self {
            SelectionPhase::Idle => None,
            SelectionPhase::AwaitingBatch { key }
            | SelectionPhase::Ready { key, .. }
            | SelectionPhase::AllFailed { key } => Some(key),
        }
    }

    /// Short label for logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            SelectionPhase::Idle => "idle",
            SelectionPhase::AwaitingBatch { .. } => "awaiting_batch",
            SelectionPhase::Ready { .. } => "ready",
            SelectionPhase::AllFailed { .. } => "all_failed",
        }
    }
}

/// The displayed variant of the current source
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveSelection {
    /// Current source key
    pub key: SourceKey,
    /// Active variant
    pub variant: VariantId,
    /// Raw or transformed
    pub mode: DisplayMode,
}

/// What [`Previewer::select_variant`](crate::Previewer::select_variant) did
#[derive(Debug)]
pub enum SelectOutcome {
    /// The variant was loaded; it is now active
    Switched(VariantId),
    /// The variant had failed; a retry is running and the previous variant stays
    /// active until it loads
    Retrying(RetryHandle),
    /// The variant is already being fetched; nothing changed
    AlreadyPending,
}

/// Active variant together with its payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveView {
    /// The selection
    pub selection: ActiveSelection,
    /// Payload of the active variant
    pub payload: PreviewPayload,
}

impl ActiveView {
    /// Content for the current display mode
    pub fn content(&self) -> &str {
        match self.selection.mode {
            DisplayMode::Raw => &self.payload.raw_content,
            DisplayMode::Transformed => &self.payload.transformed_content,
        }
    }

    /// Front-matter and body of the transformed content
    pub fn extracted(&self) -> Extracted {
        extract(&self.payload.transformed_content)
    }
}

/// Point-in-time view of the whole preview for rendering
#[derive(Clone, Debug, Serialize)]
pub struct PreviewSnapshot {
    /// Current phase
    pub phase: SelectionPhase,
    /// Display mode
    pub mode: DisplayMode,
    /// Generation of the current cache entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
    /// Variant requested by the user whose retry has not settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_selection: Option<VariantId>,
    /// Per-variant state; empty before the first submission
    pub variants: Vec<VariantSummary>,
}

/// Mutable selection state, guarded together with the cache
#[derive(Debug, Default)]
pub(crate) struct SelectionState {
    phase: SelectionPhase,
    mode: DisplayMode,
    pending_selection: Option<VariantId>,
}

impl SelectionState {
    pub(crate) fn phase(&self) -> &SelectionPhase {
        &self.phase
    }

    pub(crate) fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub(crate) fn pending_selection(&self) -> Option<VariantId> {
        self.pending_selection
    }

    pub(crate) fn active(&self) -> Option<ActiveSelection> {
        match &self.phase {
            SelectionPhase::Ready { key, active } => Some(ActiveSelection {
                key: key.clone(),
                variant: *active,
                mode: self.mode,
            }),
            _ => None,
        }
    }

    /// A batch started for `key`; everything about the previous key is dropped
    pub(crate) fn await_batch(&mut self, key: SourceKey) {
        self.phase = SelectionPhase::AwaitingBatch { key };
        self.pending_selection = None;
    }

    /// The batch for `key` committed
    pub(crate) fn settle_batch(&mut self, key: SourceKey, initial: Option<VariantId>) {
        self.phase = match initial {
            Some(active) => SelectionPhase::Ready { key, active },
            None => SelectionPhase::AllFailed { key },
        };
    }

    pub(crate) fn switch_to(&mut self, variant: VariantId) {
        if let SelectionPhase::Ready { active, .. } = &mut self.phase {
            *active = variant;
        }
        self.pending_selection = None;
    }

    pub(crate) fn request(&mut self, variant: VariantId) {
        self.pending_selection = Some(variant);
    }

    /// A retried variant loaded for the current key
    ///
    /// Returns true if it became the active variant: either it was the latest
    /// requested selection, or nothing was active because every variant had failed.
    pub(crate) fn retry_loaded(&mut self, variant: VariantId) -> bool {
        match &self.phase {
            SelectionPhase::AllFailed { key } => {
                self.phase = SelectionPhase::Ready {
                    key: key.clone(),
                    active: variant,
                };
                self.pending_selection = None;
                true
            }
            SelectionPhase::Ready { .. } if self.pending_selection == Some(variant) => {
                self.switch_to(variant);
                true
            }
            _ => false,
        }
    }

    /// A retried variant failed again; a pending request for it is dropped
    pub(crate) fn retry_failed(&mut self, variant: VariantId) {
        if self.pending_selection == Some(variant) {
            self.pending_selection = None;
        }
    }

    pub(crate) fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }
}
