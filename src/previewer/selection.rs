//! Variant selection, display mode and read-only views

use tracing::debug;

use super::Previewer;
use crate::error::{Error, Result};
use crate::selection::{ActiveView, PreviewSnapshot, SelectOutcome, SelectionPhase};
use crate::types::{DisplayMode, Event, VariantId, VariantState};

impl Previewer {
    /// Make `variant` the active variant
    ///
    /// Synchronous. A loaded variant becomes active immediately without any network
    /// call. A failed variant is retried and becomes active once it loads, provided
    /// no other variant was selected in the meantime; until then the previous
    /// variant stays active. A variant that is already being fetched is left alone.
    ///
    /// Must be called from within a tokio runtime, since a retry may be spawned.
    ///
    /// # Errors
    ///
    /// [`Error::NotReady`] unless a batch has settled with at least one loaded variant.
    pub fn select_variant(&self, variant: VariantId) -> Result<SelectOutcome> {
        let mut guard = self.write_state("select_variant");
        let state = &mut *guard;

        let (key, active) = match state.selection.phase() {
            SelectionPhase::Ready { key, active } => (key.clone(), *active),
            other => {
                return Err(Error::not_ready(format!(
                    "cannot select a variant while {}",
                    other.label()
                )));
            }
        };

        let Some(entry) = state.cache.read(&key) else {
            return Err(Error::not_ready("selection refers to a superseded source"));
        };
        let generation = entry.generation();

        match entry.state(variant) {
            VariantState::Loaded(_) => {
                state.selection.switch_to(variant);
                if variant != active {
                    debug!(source_key = %key, variant = %variant, "Active variant switched");
                    self.emit_event(Event::ActiveVariantChanged { key, variant });
                }
                Ok(SelectOutcome::Switched(variant))
            }
            VariantState::Failed(_) => {
                state.cache.begin_retry(&key, variant)?;
                state.selection.request(variant);
                self.emit_event(Event::RetryStarted {
                    key: key.clone(),
                    variant,
                });
                drop(guard);
                Ok(SelectOutcome::Retrying(self.spawn_retry(key, generation, variant)))
            }
            VariantState::Pending => Ok(SelectOutcome::AlreadyPending),
            VariantState::Unrequested => Err(Error::not_ready(format!(
                "{} variant has not been requested",
                variant
            ))),
        }
    }

    /// Switch between raw and transformed content
    ///
    /// # Errors
    ///
    /// [`Error::NotReady`] unless there is an active variant.
    pub fn set_display_mode(&self, mode: DisplayMode) -> Result<()> {
        let mut state = self.write_state("set_display_mode");
        if state.selection.active().is_none() {
            return Err(Error::not_ready(format!(
                "cannot change display mode while {}",
                state.selection.phase().label()
            )));
        }
        if state.selection.mode() != mode {
            state.selection.set_mode(mode);
            self.emit_event(Event::DisplayModeChanged { mode });
        }
        Ok(())
    }

    /// The active variant and its payload
    pub fn active_view(&self) -> Option<ActiveView> {
        let state = self.read_state("active_view");
        let selection = state.selection.active()?;
        let payload = state
            .cache
            .read(&selection.key)?
            .payload(selection.variant)?
            .clone();
        Some(ActiveView { selection, payload })
    }

    /// Phase and per-variant state for rendering
    pub fn snapshot(&self) -> PreviewSnapshot {
        let state = self.read_state("snapshot");
        let entry = state.cache.current();
        PreviewSnapshot {
            phase: state.selection.phase().clone(),
            mode: state.selection.mode(),
            generation: entry.map(|e| e.generation()),
            pending_selection: state.selection.pending_selection(),
            variants: entry.map(|e| e.summary()).unwrap_or_default(),
        }
    }
}
