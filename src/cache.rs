//! Preview cache
//!
//! Authoritative store of per-variant state for the current source key. The cache
//! holds exactly one [`CacheEntry`] at a time; switching keys replaces it wholesale,
//! so state for a superseded key can never be read or written again.
//!
//! Every mutation is checked against the current key (and, for batches, the latest
//! generation). A commit that fails the check returns [`CommitOutcome::Stale`] and
//! leaves the cache untouched.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{Error, FetchError, Result};
use crate::types::{Generation, PreviewPayload, SourceKey, VariantId, VariantState, VariantSummary};

/// Result of applying fetch outcomes to the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The outcomes were written
    Applied,
    /// The key or generation is no longer current; nothing was written
    Stale,
}

impl CommitOutcome {
    /// Whether the commit was applied
    pub fn is_applied(self) -> bool {
        matches!(self, CommitOutcome::Applied)
    }
}

/// Per-variant state for one source key
#[derive(Clone, Debug)]
pub struct CacheEntry {
    key: SourceKey,
    generation: Generation,
    states: BTreeMap<VariantId, VariantState>,
    updated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(key: SourceKey, generation: Generation) -> Self {
        Self {
            key,
            generation,
            states: VariantId::ALL
                .into_iter()
                .map(|v| (v, VariantState::Unrequested))
                .collect(),
            updated_at: Utc::now(),
        }
    }

    /// Source key this entry belongs to
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Generation of the batch that created this entry
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Last time any variant state changed
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// State of one variant
    pub fn state(&self, variant: VariantId) -> &VariantState {
        // Every variant is inserted on construction
        static UNREQUESTED: VariantState = VariantState::Unrequested;
        self.states.get(&variant).unwrap_or(&UNREQUESTED)
    }

    /// Payload of a loaded variant
    pub fn payload(&self, variant: VariantId) -> Option<&PreviewPayload> {
        match self.state(variant) {
            VariantState::Loaded(payload) => Some(payload),
            _ => None,
        }
    }

    /// Loaded variants in enumeration order
    pub fn loaded(&self) -> Vec<VariantId> {
        self.filter(VariantState::is_loaded)
    }

    /// Failed variants with their errors
    pub fn failed(&self) -> BTreeMap<VariantId, FetchError> {
        self.states
            .iter()
            .filter_map(|(variant, state)| match state {
                VariantState::Failed(error) => Some((*variant, error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Variants with a fetch in flight
    pub fn pending(&self) -> Vec<VariantId> {
        self.filter(|s| matches!(s, VariantState::Pending))
    }

    /// Whether no variant is pending or unrequested
    pub fn is_settled(&self) -> bool {
        self.states
            .values()
            .all(|s| s.is_loaded() || s.is_failed())
    }

    /// Per-variant summary for rendering
    pub fn summary(&self) -> Vec<VariantSummary> {
        self.states
            .iter()
            .map(|(variant, state)| VariantSummary {
                variant: *variant,
                state: state.label(),
                error: match state {
                    VariantState::Failed(e) => Some(e.to_string()),
                    _ => None,
                },
                retryable: state.is_failed(),
            })
            .collect()
    }

    fn filter(&self, predicate: impl Fn(&VariantState) -> bool) -> Vec<VariantId> {
        self.states
            .iter()
            .filter(|(_, state)| predicate(state))
            .map(|(variant, _)| *variant)
            .collect()
    }

    fn set(&mut self, variant: VariantId, state: VariantState) {
        self.states.insert(variant, state);
        self.updated_at = Utc::now();
    }
}

/// In-memory cache for the current source key
#[derive(Debug, Default)]
pub struct PreviewCache {
    entry: Option<CacheEntry>,
    latest: Generation,
}

impl PreviewCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current entry with a fresh one for `key`
    ///
    /// Every variant starts `Unrequested`. Returns the newly issued generation,
    /// which is strictly greater than any generation issued before.
    pub fn reset(&mut self, key: SourceKey) -> Generation {
        self.latest = self.latest.next();
        if let Some(previous) = &self.entry {
            tracing::debug!(
                previous_key = %previous.key,
                source_key = %key,
                generation = %self.latest,
                "Discarding cached variants for previous source"
            );
        }
        self.entry = Some(CacheEntry::new(key, self.latest));
        self.latest
    }

    /// Mark every variant pending for a batch that just started
    pub fn mark_pending(&mut self, key: &SourceKey, generation: Generation) -> CommitOutcome {
        let Some(entry) = self.current_batch_mut(key, generation) else {
            return CommitOutcome::Stale;
        };
        for variant in VariantId::ALL {
            entry.set(variant, VariantState::Pending);
        }
        CommitOutcome::Applied
    }

    /// Move a failed variant back to pending ahead of a retry
    pub fn begin_retry(&mut self, key: &SourceKey, variant: VariantId) -> Result<()> {
        let entry = self
            .entry
            .as_mut()
            .filter(|e| &e.key == key)
            .ok_or_else(|| Error::not_ready(format!("{} is no longer the current source", key)))?;

        match entry.state(variant) {
            VariantState::Failed(_) => {
                entry.set(variant, VariantState::Pending);
                Ok(())
            }
            other => Err(Error::RetryNotAllowed {
                variant,
                state: other.label().to_string(),
            }),
        }
    }

    /// Apply every outcome of a batch at once
    ///
    /// Returns [`CommitOutcome::Stale`] without touching anything if `key` is not the
    /// current key or `generation` is not the latest one issued.
    pub fn commit_batch<I>(&mut self, key: &SourceKey, generation: Generation, results: I) -> CommitOutcome
    where
        I: IntoIterator<Item = (VariantId, std::result::Result<PreviewPayload, FetchError>)>,
    {
        let Some(entry) = self.current_batch_mut(key, generation) else {
            return CommitOutcome::Stale;
        };
        for (variant, result) in results {
            entry.set(variant, settle(result));
        }
        CommitOutcome::Applied
    }

    /// Apply the outcome of one retried fetch
    ///
    /// Stale if `key` is not current or the variant is no longer pending.
    pub fn commit_single(
        &mut self,
        key: &SourceKey,
        variant: VariantId,
        result: std::result::Result<PreviewPayload, FetchError>,
    ) -> CommitOutcome {
        match self.entry.as_mut() {
            Some(entry) if &entry.key == key && matches!(entry.state(variant), VariantState::Pending) => {
                entry.set(variant, settle(result));
                CommitOutcome::Applied
            }
            _ => CommitOutcome::Stale,
        }
    }

    /// Entry for `key`, or `None` if `key` is not the current key
    pub fn read(&self, key: &SourceKey) -> Option<&CacheEntry> {
        self.entry.as_ref().filter(|e| &e.key == key)
    }

    /// Entry for the current key
    pub fn current(&self) -> Option<&CacheEntry> {
        self.entry.as_ref()
    }

    /// Latest generation issued by [`reset`](Self::reset)
    pub fn latest_generation(&self) -> Generation {
        self.latest
    }

    fn current_batch_mut(&mut self, key: &SourceKey, generation: Generation) -> Option<&mut CacheEntry> {
        let latest = self.latest;
        self.entry
            .as_mut()
            .filter(|e| &e.key == key && generation == latest && e.generation == generation)
    }
}

fn settle(result: std::result::Result<PreviewPayload, FetchError>) -> VariantState {
    match result {
        Ok(payload) => VariantState::Loaded(payload),
        Err(error) => VariantState::Failed(error),
    }
}
