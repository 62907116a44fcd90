//! Export packaging
//!
//! A [`Packager`] turns the active variant's transformed content into a
//! downloadable bundle. Two implementations ship with the crate:
//!
//! - [`HttpPackager`] forwards the request to an export service and streams its response
//! - [`ZipPackager`] builds a small archive in-process

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};

use crate::config::PackagerConfig;
use crate::error::{Error, PackageError, Result};
use crate::fetcher::retry_after_secs;
use crate::types::{SourceKey, VariantId};

/// Content type of zip bundles
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// What gets exported
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Source the content was transformed from
    pub source_key: SourceKey,
    /// Variant being exported
    pub variant_id: VariantId,
    /// The variant's transformed content
    pub transformed_content: String,
}

impl ExportRequest {
    /// `<host>-<variant>.zip`, used when the packager does not name the bundle
    pub fn default_filename(&self) -> String {
        let host = self
            .source_key
            .host()
            .unwrap_or_else(|| "export".to_string());
        format!("{}-{}.zip", host, self.variant_id)
    }
}

/// Bundle produced by a packager
///
/// The body is a stream so large bundles do not have to be buffered; call
/// [`into_bytes`](Self::into_bytes) when the whole thing is needed at once.
pub struct ExportBundle {
    /// Suggested filename for saving the bundle
    pub filename: String,
    /// MIME type of the body
    pub content_type: String,
    /// Bundle contents
    pub body: BoxStream<'static, std::result::Result<Bytes, PackageError>>,
}

impl ExportBundle {
    /// Bundle whose body is already in memory
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            body: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    /// Collect the whole body
    pub async fn into_bytes(self) -> std::result::Result<Bytes, PackageError> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for ExportBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportBundle")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Turns exported content into a downloadable bundle
#[async_trait]
pub trait Packager: Send + Sync {
    /// Build a bundle for `request`
    async fn package(
        &self,
        request: ExportRequest,
    ) -> std::result::Result<ExportBundle, PackageError>;

    /// Name of the packager, for logging
    fn name(&self) -> &str;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Packager backed by the export service's `/api/export` endpoint
pub struct HttpPackager {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPackager {
    /// Create a packager from the packager settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &PackagerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/export", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Packager for HttpPackager {
    async fn package(
        &self,
        request: ExportRequest,
    ) -> std::result::Result<ExportBundle, PackageError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PackageError::Network(format!("export timed out: {}", e))
                } else {
                    PackageError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PackageError::RateLimited {
                retry_after_secs: retry_after_secs(response.headers()),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            return Err(PackageError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let filename = filename_from_headers(response.headers())
            .unwrap_or_else(|| request.default_filename());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(ZIP_CONTENT_TYPE)
            .to_string();

        tracing::debug!(
            source_key = %request.source_key,
            variant = %request.variant_id,
            filename = %filename,
            "Export service accepted request, streaming bundle"
        );

        Ok(ExportBundle {
            filename,
            content_type,
            body: response
                .bytes_stream()
                .map_err(|e| PackageError::Network(format!("bundle download interrupted: {}", e)))
                .boxed(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Filename suggested by a `Content-Disposition` header
///
/// Handles both `filename="..."` and the RFC 5987 `filename*=charset'lang'value`
/// form. Only the final path component is kept.
fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

    // Format: attachment; filename="bundle.zip" or filename*=UTF-8''bundle.zip
    let mut plain = None;
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            if let Some(idx) = encoded.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(&encoded[idx + 1..])
            {
                // The extended form wins over the plain one
                return sanitize(decoded.trim_matches('"'));
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            plain = sanitize(name.trim_matches('"'));
        }
    }
    plain
}

// Servers on any platform may send either separator
fn sanitize(name: &str) -> Option<String> {
    name.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
}

/// In-process packager that writes a zip archive
///
/// The archive holds the transformed content as `content/index.mdx` and a
/// `README.md` describing where it came from.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZipPackager;

impl ZipPackager {
    /// Create a zip packager
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Packager for ZipPackager {
    async fn package(
        &self,
        request: ExportRequest,
    ) -> std::result::Result<ExportBundle, PackageError> {
        let filename = request.default_filename();
        let exported_at = Utc::now();

        // zip writing is synchronous
        let bytes = tokio::task::spawn_blocking(move || build_archive(&request, exported_at))
            .await
            .map_err(|e| PackageError::Build {
                message: format!("archive task failed: {}", e),
            })??;

        Ok(ExportBundle::from_bytes(filename, ZIP_CONTENT_TYPE, bytes))
    }

    fn name(&self) -> &str {
        "zip"
    }
}

fn build_archive(
    request: &ExportRequest,
    exported_at: DateTime<Utc>,
) -> std::result::Result<Vec<u8>, PackageError> {
    let build_err = |e: &dyn std::fmt::Display| PackageError::Build {
        message: e.to_string(),
    };

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    writer
        .start_file("content/index.mdx", options)
        .map_err(|e| build_err(&e))?;
    writer
        .write_all(request.transformed_content.as_bytes())
        .map_err(|e| build_err(&e))?;

    writer
        .start_file("README.md", options)
        .map_err(|e| build_err(&e))?;
    writer
        .write_all(readme(request, exported_at).as_bytes())
        .map_err(|e| build_err(&e))?;

    let cursor = writer.finish().map_err(|e| build_err(&e))?;
    Ok(cursor.into_inner())
}

fn readme(request: &ExportRequest, exported_at: DateTime<Utc>) -> String {
    let info = request.variant_id.info();
    format!(
        "# Offramp export\n\n\
         - Source: {}\n\
         - Theme: {} ({})\n\
         - Exported: {}\n\n\
         The transformed article is in `content/index.mdx`.\n",
        request.source_key,
        info.name,
        info.description,
        exported_at.to_rfc3339(),
    )
}
