//! The [`Previewer`] store, split into focused submodules.
//!
//! `Previewer` owns the cache, the selection state and both collaborators.
//! Its methods are organized by concern:
//! - [`batch`] - Source submission and the fan-out/join batch
//! - [`retry`] - Single-variant retries
//! - [`selection`] - Variant selection, display mode and read-only views
//! - [`export`] - Forwarding the active variant to the packager
//!
//! Cache and selection live behind one `std::sync::RwLock`. It is only taken for
//! synchronous sections and never held across an `.await`, so every commit is
//! atomic with respect to the rest of the state machine.

mod batch;
mod export;
mod lock;
mod retry;
mod selection;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use retry::{RetryHandle, RetryOutcome};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use crate::cache::PreviewCache;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{HttpVariantFetcher, VariantFetcher};
use crate::packager::{HttpPackager, Packager};
use crate::selection::SelectionState;
use crate::types::{Event, SourceKey};

/// Everything guarded by the state lock
#[derive(Debug, Default)]
pub(crate) struct PreviewState {
    pub(crate) cache: PreviewCache,
    pub(crate) selection: SelectionState,
}

/// Multi-variant preview store (cloneable - all fields are Arc-wrapped)
///
/// Construct it once and hand clones to whatever needs to drive or observe the
/// preview. Clones share state.
#[derive(Clone)]
pub struct Previewer {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Cache and selection state
    pub(crate) state: Arc<RwLock<PreviewState>>,
    /// Source of variant payloads (trait object for pluggable implementations)
    pub(crate) fetcher: Arc<dyn VariantFetcher>,
    /// Export packager (trait object for pluggable implementations)
    pub(crate) packager: Arc<dyn Packager>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl Previewer {
    /// Create a previewer with explicit collaborators
    ///
    /// # Errors
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid
    pub fn new(
        config: Config,
        fetcher: Arc<dyn VariantFetcher>,
        packager: Arc<dyn Packager>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);

        tracing::debug!(
            fetcher = fetcher.name(),
            packager = packager.name(),
            max_concurrent_fetches = config.max_concurrent_fetches,
            "Previewer created"
        );

        Ok(Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(PreviewState::default())),
            fetcher,
            packager,
            event_tx,
        })
    }

    /// Create a previewer talking to the configured HTTP services
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use offramp_preview::{Config, Previewer};
    ///
    /// # async fn example() -> offramp_preview::Result<()> {
    /// let previewer = Previewer::from_config(Config::default())?;
    /// previewer.submit_source("blog.example.com/2024/hello-world").await?;
    ///
    /// if let Some(view) = previewer.active_view() {
    ///     println!("{}", view.content());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpVariantFetcher::new(&config.transform)?);
        let packager = Arc::new(HttpPackager::new(&config.packager)?);
        Self::new(config, fetcher, packager)
    }

    /// Subscribe to preview events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than `event_buffer` events receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Source key currently being previewed
    pub fn current_key(&self) -> Option<SourceKey> {
        self.read_state("current_key")
            .cache
            .current()
            .map(|entry| entry.key().clone())
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    pub(crate) fn read_state(&self, op: &'static str) -> RwLockReadGuard<'_, PreviewState> {
        lock::rw_read(&self.state, op)
    }

    pub(crate) fn write_state(&self, op: &'static str) -> RwLockWriteGuard<'_, PreviewState> {
        lock::rw_write(&self.state, op)
    }
}
