//! # offramp-preview
//!
//! Multi-theme preview cache and export orchestration for migrated WordPress content.
//!
//! A source URL is rendered in several themes ("variants") by a transform service.
//! This crate fetches every variant concurrently, caches the results for the current
//! source, lets the user switch between them without refetching, retries the ones that
//! failed, and hands the active one to a packager for download.
//!
//! ## Design Philosophy
//!
//! offramp-preview is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Explicitly owned** - One [`Previewer`] holds all state; clones share it
//! - **Stale-safe** - Results for a source that is no longer current are never applied
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use offramp_preview::{Config, Previewer, VariantId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let previewer = Previewer::from_config(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = previewer.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     previewer.submit_source("blog.example.com/2024/hello-world").await?;
//!     previewer.select_variant(VariantId::Ghibli)?;
//!
//!     let bundle = previewer.export_active().await?;
//!     let bytes = bundle.into_bytes().await?;
//!     println!("exported {} bytes", bytes.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Per-source variant cache
pub mod cache;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Front-matter extraction
pub mod extract;
/// Variant fetchers
pub mod fetcher;
/// Export packagers
pub mod packager;
/// The preview store and its operations
pub mod previewer;
/// Retry logic with exponential backoff
pub mod retry;
/// Selection state machine
pub mod selection;
/// Source key normalization
pub mod source_key;
/// Core types
pub mod types;

// Re-export commonly used types
pub use cache::{CacheEntry, CommitOutcome, PreviewCache};
pub use config::{Config, PackagerConfig, RetryConfig, TransformConfig};
pub use error::{Error, FetchError, PackageError, Result};
pub use extract::{Extracted, extract};
pub use fetcher::{HttpVariantFetcher, VariantFetcher};
pub use packager::{ExportBundle, ExportRequest, HttpPackager, Packager, ZipPackager};
pub use previewer::{Previewer, RetryHandle, RetryOutcome};
pub use selection::{ActiveSelection, ActiveView, PreviewSnapshot, SelectOutcome, SelectionPhase};
pub use types::{
    BatchOutcome, BatchReport, DisplayMode, Event, Generation, PreviewPayload, SourceKey,
    VariantId, VariantInfo, VariantState, VariantSummary,
};
