//! Export of the active variant

use tracing::{info, warn};

use super::Previewer;
use crate::error::{Error, Result};
use crate::packager::{ExportBundle, ExportRequest};
use crate::types::Event;

impl Previewer {
    /// Package the active variant's transformed content
    ///
    /// Reads the current source and active variant, then hands the content to the
    /// packager. Neither the cache nor the selection is modified.
    ///
    /// # Errors
    ///
    /// * [`Error::NotReady`] if there is no loaded active variant; the packager is not called
    /// * [`Error::RateLimited`] if the packager is rate limiting
    /// * [`Error::Export`] for any other packager failure
    pub async fn export_active(&self) -> Result<ExportBundle> {
        let request = {
            let state = self.read_state("export_active");
            let selection = state.selection.active().ok_or_else(|| {
                Error::not_ready(format!(
                    "nothing to export while {}",
                    state.selection.phase().label()
                ))
            })?;
            let payload = state
                .cache
                .read(&selection.key)
                .and_then(|entry| entry.payload(selection.variant))
                .ok_or_else(|| {
                    Error::not_ready(format!("{} variant is not loaded", selection.variant))
                })?;
            ExportRequest {
                source_key: selection.key.clone(),
                variant_id: selection.variant,
                transformed_content: payload.transformed_content.clone(),
            }
        };

        let key = request.source_key.clone();
        let variant = request.variant_id;
        info!(
            source_key = %key,
            variant = %variant,
            packager = self.packager.name(),
            "Exporting active variant"
        );
        self.emit_event(Event::ExportStarted {
            key: key.clone(),
            variant,
        });

        match self.packager.package(request).await {
            Ok(bundle) => {
                info!(source_key = %key, variant = %variant, filename = %bundle.filename, "Export ready");
                self.emit_event(Event::ExportComplete {
                    key,
                    variant,
                    filename: bundle.filename.clone(),
                });
                Ok(bundle)
            }
            Err(e) => {
                warn!(source_key = %key, variant = %variant, error = %e, "Export failed");
                self.emit_event(Event::ExportFailed {
                    key,
                    variant,
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}
