//! Shared test helpers: scripted collaborators and a previewer wired to them.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, watch};

use super::Previewer;
use crate::config::Config;
use crate::error::{FetchError, PackageError};
use crate::fetcher::VariantFetcher;
use crate::packager::{ExportBundle, ExportRequest, Packager};
use crate::types::{PreviewPayload, SourceKey, VariantId};

type Outcome = std::result::Result<PreviewPayload, FetchError>;

/// Payload the scripted fetcher returns by default
pub(crate) fn payload_for(key: &SourceKey, variant: VariantId) -> PreviewPayload {
    PreviewPayload {
        title: format!("{} as {}", key, variant),
        author: Some("Test Author".to_string()),
        published_date: Some("2024-01-15".to_string()),
        raw_content: format!("<p>{}</p>", key),
        transformed_content: format!(
            "---\ntitle: \"{} as {}\"\nauthor: Test Author\n---\n# {}",
            key, variant, variant
        ),
    }
}

/// In-memory fetcher whose answers are scripted per (source, variant)
///
/// Unscripted calls succeed with [`payload_for`]. Scripted outcomes are consumed
/// in order. Fetches for a gated source block until the gate is opened.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<(SourceKey, VariantId), VecDeque<Outcome>>>,
    gates: Mutex<HashMap<SourceKey, watch::Sender<bool>>>,
    calls: Mutex<Vec<(SourceKey, VariantId)>>,
    called: Notify,
    panics: Mutex<HashSet<(SourceKey, VariantId)>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an outcome for the next fetch of (key, variant)
    pub(crate) fn script(&self, key: &SourceKey, variant: VariantId, outcome: Outcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry((key.clone(), variant))
            .or_default()
            .push_back(outcome);
    }

    /// Make (key, variant) fail with HTTP 500 on its next fetch
    pub(crate) fn fail_next(&self, key: &SourceKey, variant: VariantId) {
        self.script(key, variant, Err(FetchError::Http { status: 500 }));
    }

    /// Make the next fetch of (key, variant) panic
    pub(crate) fn panic_next(&self, key: &SourceKey, variant: VariantId) {
        self.panics.lock().unwrap().insert((key.clone(), variant));
    }

    /// Hold every fetch for `key` until [`open`](Self::open) is called
    pub(crate) fn gate(&self, key: &SourceKey) {
        let (tx, _rx) = watch::channel(false);
        self.gates.lock().unwrap().insert(key.clone(), tx);
    }

    pub(crate) fn open(&self, key: &SourceKey) {
        if let Some(tx) = self.gates.lock().unwrap().get(key) {
            tx.send_replace(true);
        }
    }

    /// Every call so far
    pub(crate) fn calls(&self) -> Vec<(SourceKey, VariantId)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Wait until at least `n` calls for `key` have started
    pub(crate) async fn wait_for_calls(&self, key: &SourceKey, n: usize) {
        let wait = async {
            loop {
                let notified = self.called.notified();
                let seen = self.calls().iter().filter(|(k, _)| k == key).count();
                if seen >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for fetch calls");
    }
}

#[async_trait]
impl VariantFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &SourceKey, variant: VariantId) -> Outcome {
        self.calls.lock().unwrap().push((key.clone(), variant));
        self.called.notify_waiters();

        let should_panic = self.panics.lock().unwrap().remove(&(key.clone(), variant));
        if should_panic {
            panic!("scripted fetcher panic for {key} as {variant}");
        }

        let gate = self.gates.lock().unwrap().get(key).map(|tx| tx.subscribe());
        if let Some(mut rx) = gate {
            rx.wait_for(|open| *open).await.ok();
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&(key.clone(), variant))
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(payload_for(key, variant)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// How the recording packager answers
#[derive(Clone, Copy, Debug)]
pub(crate) enum PackagerScript {
    Succeed,
    RateLimit(Option<u64>),
    ServerError,
}

/// Packager that records every request
pub(crate) struct RecordingPackager {
    script: Mutex<PackagerScript>,
    requests: Mutex<Vec<ExportRequest>>,
    count: AtomicUsize,
}

impl RecordingPackager {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(PackagerScript::Succeed),
            requests: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        })
    }

    pub(crate) fn respond_with(&self, script: PackagerScript) {
        *self.script.lock().unwrap() = script;
    }

    pub(crate) fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Packager for RecordingPackager {
    async fn package(
        &self,
        request: ExportRequest,
    ) -> std::result::Result<ExportBundle, PackageError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let script = *self.script.lock().unwrap();
        match script {
            PackagerScript::Succeed => Ok(ExportBundle::from_bytes(
                request.default_filename(),
                "application/zip",
                request.transformed_content.into_bytes(),
            )),
            PackagerScript::RateLimit(retry_after_secs) => {
                Err(PackageError::RateLimited { retry_after_secs })
            }
            PackagerScript::ServerError => Err(PackageError::Http {
                status: 500,
                message: "Failed to generate ZIP file".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Test previewer wired to the given collaborators
pub(crate) fn create_test_previewer(
    fetcher: Arc<ScriptedFetcher>,
    packager: Arc<RecordingPackager>,
) -> Previewer {
    Previewer::new(Config::default(), fetcher, packager).unwrap()
}

pub(crate) fn key(raw: &str) -> SourceKey {
    SourceKey::parse(raw).unwrap()
}
