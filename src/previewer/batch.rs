//! Source submission and the batch fan-out/join

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::Previewer;
use crate::cache::CommitOutcome;
use crate::error::{Error, FetchError, Result};
use crate::source_key::normalize_with_scheme;
use crate::types::{BatchOutcome, BatchReport, Event, Generation, PreviewPayload, SourceKey, VariantId};

type VariantResult = (VariantId, std::result::Result<PreviewPayload, FetchError>);

impl Previewer {
    /// Normalize `raw` and load every variant for it
    ///
    /// Invalid input is rejected before anything changes. Otherwise the cache and
    /// selection for the previous source are discarded, every variant is fetched
    /// concurrently, and all outcomes are committed together.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOutcome::Complete)` when at least one variant loaded (some may have failed)
    /// * `Ok(BatchOutcome::Superseded)` when another source was submitted before this batch settled
    /// * `Err(Error::TotalBatchFailure)` when every variant failed
    pub async fn submit_source(&self, raw: &str) -> Result<BatchOutcome> {
        let key = normalize_with_scheme(raw, &self.config.default_scheme)?;
        self.run(key).await
    }

    /// Load every variant for an already-normalized key
    pub async fn run(&self, key: SourceKey) -> Result<BatchOutcome> {
        let generation = {
            let mut state = self.write_state("run.begin");
            let generation = state.cache.reset(key.clone());
            state.cache.mark_pending(&key, generation);
            state.selection.await_batch(key.clone());
            self.emit_event(Event::BatchStarted {
                key: key.clone(),
                generation,
            });
            generation
        };

        info!(
            source_key = %key,
            generation = %generation,
            fetcher = self.fetcher.name(),
            "Starting preview batch"
        );

        let results = self.fetch_all(&key).await;

        let mut loaded = Vec::new();
        let mut failed = BTreeMap::new();
        for (variant, result) in &results {
            match result {
                Ok(_) => loaded.push(*variant),
                Err(e) => {
                    failed.insert(*variant, e.clone());
                }
            }
        }
        loaded.sort();

        let active = {
            let mut state = self.write_state("run.commit");
            if state.cache.commit_batch(&key, generation, results) == CommitOutcome::Stale {
                debug!(
                    source_key = %key,
                    generation = %generation,
                    latest_generation = %state.cache.latest_generation(),
                    "Batch superseded, dropping results"
                );
                self.emit_event(Event::BatchSuperseded {
                    key: key.clone(),
                    generation,
                });
                return Ok(BatchOutcome::Superseded { key, generation });
            }

            let active = self
                .config
                .selection_order()
                .into_iter()
                .find(|v| loaded.contains(v));
            state.selection.settle_batch(key.clone(), active);
            self.emit_settled(&key, generation, &loaded, &failed, active);
            active
        };

        let Some(active) = active else {
            warn!(
                source_key = %key,
                generation = %generation,
                "Every variant failed to load"
            );
            return Err(Error::TotalBatchFailure {
                key,
                failures: failed,
            });
        };

        if failed.is_empty() {
            info!(source_key = %key, generation = %generation, active = %active, "Preview batch complete");
        } else {
            warn!(
                source_key = %key,
                generation = %generation,
                loaded = loaded.len(),
                failed = failed.len(),
                active = %active,
                "Preview batch complete with failed variants"
            );
        }

        Ok(BatchOutcome::Complete(BatchReport {
            key,
            generation,
            loaded,
            failed,
            active,
            settled_at: chrono::Utc::now(),
        }))
    }

    /// Fetch every variant, waiting for all of them
    async fn fetch_all(&self, key: &SourceKey) -> Vec<VariantResult> {
        let fetcher = &self.fetcher;
        stream::iter(VariantId::ALL)
            .map(|variant| async move {
                let result = fetcher.fetch(key, variant).await;
                if let Err(e) = &result {
                    debug!(source_key = %key, variant = %variant, error = %e, "Variant fetch failed");
                }
                (variant, result)
            })
            .buffer_unordered(self.config.max_concurrent_fetches)
            .collect()
            .await
    }

    // Called with the state lock held so subscribers see commit order
    fn emit_settled(
        &self,
        key: &SourceKey,
        generation: Generation,
        loaded: &[VariantId],
        failed: &BTreeMap<VariantId, FetchError>,
        active: Option<VariantId>,
    ) {
        for variant in loaded {
            self.emit_event(Event::VariantLoaded {
                key: key.clone(),
                variant: *variant,
            });
        }
        for (variant, error) in failed {
            self.emit_event(Event::VariantFailed {
                key: key.clone(),
                variant: *variant,
                error: error.clone(),
            });
        }
        self.emit_event(Event::BatchSettled {
            key: key.clone(),
            generation,
            loaded: loaded.to_vec(),
            failed: failed.keys().copied().collect(),
        });
        match active {
            Some(variant) => self.emit_event(Event::ActiveVariantChanged {
                key: key.clone(),
                variant,
            }),
            None => self.emit_event(Event::AllVariantsFailed { key: key.clone() }),
        }
    }
}
