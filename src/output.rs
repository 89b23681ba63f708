//! What happens to a finished document: saving it and flattening it.
//!
//! ## Rule Order (plain text)
//!
//! Fence lines and horizontal rules go first so their `-`/`*` runs are not
//! mistaken for list bullets; list bullets go before emphasis so `* item` is
//! not read as an italic span.

use crate::error::MarkstreamError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::info;

/// Write Markdown to `path` atomically (temp file, then rename), creating
/// parent directories as needed. A reader never observes a half-written file.
pub async fn write_markdown(path: &Path, markdown: &str) -> Result<(), MarkstreamError> {
    let write_err = |source: std::io::Error| MarkstreamError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_err)?;

    info!("Wrote {} bytes to {}", markdown.len(), path.display());
    Ok(())
}

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(```|~~~).*\n?").unwrap());
static RE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([-*_][ \t]*){3,}$").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").unwrap());
static RE_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^([ \t]*)[-*+][ \t]+").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static RE_STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").unwrap());
static RE_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\n]+)\*|\b_([^_\n]+)_\b").unwrap());
static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

/// Flatten Markdown to readable plain text (the "copy as plain text" action).
pub fn plain_text(markdown: &str) -> String {
    let s = markdown.replace("\r\n", "\n");
    let s = RE_FENCE.replace_all(&s, "");
    let s = RE_RULE.replace_all(&s, "");
    let s = RE_HEADING.replace_all(&s, "");
    let s = RE_QUOTE.replace_all(&s, "");
    let s = RE_BULLET.replace_all(&s, "$1");
    let s = RE_IMAGE.replace_all(&s, "$1");
    let s = RE_LINK.replace_all(&s, "$1");
    let s = RE_STRONG.replace_all(&s, "$1$2");
    let s = RE_EMPHASIS.replace_all(&s, "$1$2");
    let s = RE_CODE.replace_all(&s, "$1");
    s.into_owned()
}
