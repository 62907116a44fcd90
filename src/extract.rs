//! Front-matter extraction for transformed content
//!
//! Transformed variants usually start with a `---` delimited metadata block
//! (title, author, date, featured image) followed by the markdown body. Model
//! output is not always well-formed, so [`extract`] never fails: anything it
//! cannot make sense of comes back as an empty metadata map with the input
//! text untouched.

use std::collections::BTreeMap;

use patterns::{BLOCK, INLINE_KEY, LINE_ENTRY};

// Patterns are compile-time constants; a failure here is a programming error
#[allow(clippy::expect_used)]
mod patterns {
    use regex::Regex;
    use std::sync::LazyLock;

    /// Leading metadata block: `---` line, block text, `---` line, rest of the document
    pub(super) static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)(.*)\z")
            .expect("front-matter block pattern")
    });

    /// `key: value` line with an optionally quoted value
    pub(super) static LINE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^\s*(\w+):\s*(?:"([^"]*)"|'([^']*)'|([^"'\s].*?))\s*$"#)
            .expect("front-matter entry pattern")
    });

    /// Start of the next `key:` on a block that was collapsed onto one line
    pub(super) static INLINE_KEY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+(\w+):").expect("inline key pattern"));
}

/// Metadata and body split out of a transformed document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Front-matter entries; empty when the document has none
    pub metadata: BTreeMap<String, String>,
    /// Document text after the metadata block
    pub body: String,
}

impl Extracted {
    /// Look up a metadata entry
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Featured image URL, accepting the spellings the transform emits
    pub fn featured_image(&self) -> Option<&str> {
        self.get("featuredImage").or_else(|| self.get("featuredimage"))
    }
}

/// Split a transformed document into front-matter and body
///
/// # Examples
///
/// ```
/// use offramp_preview::extract::extract;
///
/// let doc = extract("---\ntitle: \"Hello\"\nauthor: Ann\n---\n# Hello\n\nBody");
/// assert_eq!(doc.get("title"), Some("Hello"));
/// assert_eq!(doc.body, "# Hello\n\nBody");
///
/// let plain = extract("# No metadata here");
/// assert!(plain.metadata.is_empty());
/// assert_eq!(plain.body, "# No metadata here");
/// ```
pub fn extract(raw: &str) -> Extracted {
    let Some(caps) = BLOCK.captures(raw) else {
        return unchanged(raw);
    };
    let block = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str());

    let metadata = if block.contains('\n') {
        parse_lines(block)
    } else {
        parse_inline(block)
    };

    if metadata.is_empty() {
        tracing::debug!("front-matter block has no parsable entries, keeping text as-is");
        return unchanged(raw);
    }

    Extracted {
        metadata,
        body: body.to_string(),
    }
}

fn unchanged(raw: &str) -> Extracted {
    Extracted {
        metadata: BTreeMap::new(),
        body: raw.to_string(),
    }
}

fn parse_lines(block: &str) -> BTreeMap<String, String> {
    block
        .lines()
        .filter_map(|line| parse_entry(line.trim_end_matches('\r')))
        .collect()
}

// Some transforms put the whole block on one line: `title: "A" date: 2024-01-01`
fn parse_inline(block: &str) -> BTreeMap<String, String> {
    let mut starts: Vec<usize> = INLINE_KEY
        .captures_iter(block)
        .filter_map(|c| c.get(1).map(|m| m.start()))
        .collect();
    starts.insert(0, 0);
    starts.push(block.len());

    starts
        .windows(2)
        .filter_map(|w| parse_entry(strip_comment(&block[w[0]..w[1]])))
        .collect()
}

fn parse_entry(line: &str) -> Option<(String, String)> {
    let caps = LINE_ENTRY.captures(line)?;
    let key = caps.get(1)?.as_str().to_string();
    let value = caps
        .get(2)
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))?
        .as_str()
        .trim()
        .to_string();
    Some((key, value))
}

fn strip_comment(segment: &str) -> &str {
    match segment.find(" #") {
        Some(idx) => &segment[..idx],
        None => segment,
    }
}
