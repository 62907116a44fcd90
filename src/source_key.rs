//! Source key normalization
//!
//! Turns whatever the user pasted into a canonical [`SourceKey`]: a default scheme
//! is added when missing, scheme and host are lowercased, default ports and trailing
//! path separators are dropped, and query and fragment are preserved verbatim.

use url::{Position, Url};

use crate::error::{Error, Result};
use crate::types::SourceKey;

/// Scheme used by [`SourceKey::parse`] when the input has none
pub const DEFAULT_SCHEME: &str = "https";

impl SourceKey {
    /// Normalize raw user input, adding `https://` when no scheme is given
    ///
    /// # Examples
    ///
    /// ```
    /// use offramp_preview::SourceKey;
    ///
    /// let key = SourceKey::parse("Blog.Example.COM/2024/hello-world/")?;
    /// assert_eq!(key.as_str(), "https://blog.example.com/2024/hello-world");
    ///
    /// let key = SourceKey::parse("http://example.com/post/?p=42#comments")?;
    /// assert_eq!(key.as_str(), "http://example.com/post?p=42#comments");
    /// # Ok::<(), offramp_preview::Error>(())
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        normalize_with_scheme(raw, DEFAULT_SCHEME)
    }
}

/// Normalize raw user input, adding `default_scheme` when no scheme is given
///
/// Only `http` and `https` sources are accepted. The result is idempotent:
/// normalizing an already-normalized key returns the same key.
pub fn normalize_with_scheme(raw: &str, default_scheme: &str) -> Result<SourceKey> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("source URL is empty"));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("{}://{}", default_scheme, trimmed)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| Error::validation(format!("'{}' is not a valid URL: {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(Error::validation(format!("'{}' has no host", trimmed))),
    }

    // Everything up to the path is already lowercased and port-normalized by `Url`
    let mut normalized = url[..Position::BeforePath].to_string();
    normalized.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        normalized.push('#');
        normalized.push_str(fragment);
    }

    Ok(SourceKey::from_normalized(normalized))
}

/// Whether the input starts with `<scheme>://`
fn has_scheme(input: &str) -> bool {
    match input.find("://") {
        Some(idx) if idx > 0 => {
            let scheme = &input[..idx];
            scheme
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}
