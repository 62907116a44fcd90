//! Single-variant retries
//!
//! A retry re-fetches one failed variant of the current source on its own task.
//! It never touches other variants or the generation counter, and its result is
//! dropped if the source changed while it was in flight.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Previewer;
use crate::cache::CommitOutcome;
use crate::error::{Error, FetchError, Result};
use crate::types::{Event, Generation, PreviewPayload, SourceKey, VariantId};

/// How a retry settled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The variant loaded and was committed
    Loaded,
    /// The variant failed again; the failure was committed
    Failed(FetchError),
    /// The source changed before the retry settled; nothing was committed
    Stale,
}

/// Handle to a running retry
///
/// The retry runs whether or not the handle is awaited. Awaiting it yields the
/// [`RetryOutcome`].
#[derive(Debug)]
pub struct RetryHandle {
    variant: VariantId,
    task: JoinHandle<RetryOutcome>,
}

impl RetryHandle {
    /// Variant being retried
    pub fn variant(&self) -> VariantId {
        self.variant
    }
}

impl Future for RetryHandle {
    type Output = RetryOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let variant = self.variant;
        Pin::new(&mut self.task).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| {
                // Only reachable when the runtime cancels the task
                error!(variant = %variant, error = %e, "Retry task did not complete");
                RetryOutcome::Stale
            })
        })
    }
}

impl Previewer {
    /// Re-fetch a failed variant of the current source
    ///
    /// The variant moves to pending immediately; the fetch runs on a spawned task.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`Error::NotReady`] if no source has been submitted
    /// * [`Error::RetryNotAllowed`] if the variant is not in the failed state
    pub fn retry_variant(&self, variant: VariantId) -> Result<RetryHandle> {
        let (key, generation) = {
            let mut state = self.write_state("retry_variant");
            let (key, generation) = state
                .cache
                .current()
                .map(|entry| (entry.key().clone(), entry.generation()))
                .ok_or_else(|| Error::not_ready("no source has been submitted"))?;
            state.cache.begin_retry(&key, variant)?;
            self.emit_event(Event::RetryStarted {
                key: key.clone(),
                variant,
            });
            (key, generation)
        };

        Ok(self.spawn_retry(key, generation, variant))
    }

    /// Spawn the fetch for a variant that is already marked pending
    pub(crate) fn spawn_retry(
        &self,
        key: SourceKey,
        generation: Generation,
        variant: VariantId,
    ) -> RetryHandle {
        info!(source_key = %key, variant = %variant, "Retrying variant");

        let previewer = self.clone();
        let task = tokio::spawn(async move {
            // A panicking fetcher must not leave the variant pending forever
            let result = AssertUnwindSafe(previewer.fetcher.fetch(&key, variant))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(source_key = %key, variant = %variant, "Variant fetcher panicked during retry");
                    Err(FetchError::network("fetcher panicked"))
                });
            previewer.commit_retry(&key, generation, variant, result)
        });

        RetryHandle { variant, task }
    }

    fn commit_retry(
        &self,
        key: &SourceKey,
        generation: Generation,
        variant: VariantId,
        result: std::result::Result<PreviewPayload, FetchError>,
    ) -> RetryOutcome {
        let failure = result.as_ref().err().cloned();

        let mut state = self.write_state("retry.commit");
        // Resubmitting the same source starts a new generation under the same key
        let same_batch = state
            .cache
            .read(key)
            .is_some_and(|entry| entry.generation() == generation);
        if !same_batch
            || state.cache.commit_single(key, variant, result) == CommitOutcome::Stale
        {
            debug!(source_key = %key, variant = %variant, "Source changed during retry, dropping result");
            return RetryOutcome::Stale;
        }

        match failure {
            None => {
                info!(source_key = %key, variant = %variant, "Retry succeeded");
                self.emit_event(Event::VariantLoaded {
                    key: key.clone(),
                    variant,
                });
                if state.selection.retry_loaded(variant) {
                    self.emit_event(Event::ActiveVariantChanged {
                        key: key.clone(),
                        variant,
                    });
                }
                RetryOutcome::Loaded
            }
            Some(error) => {
                warn!(source_key = %key, variant = %variant, error = %error, "Retry failed");
                state.selection.retry_failed(variant);
                self.emit_event(Event::VariantFailed {
                    key: key.clone(),
                    variant,
                    error: error.clone(),
                });
                RetryOutcome::Failed(error)
            }
        }
    }
}
