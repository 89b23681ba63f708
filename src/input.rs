//! Input validation: turn a user-supplied path or URL into a request.
//!
//! Everything here runs before any network call. A rejected input yields a
//! [`ValidationError`] and no session, so the caller's UI can stay exactly
//! as it was.

use crate::error::ValidationError;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions the conversion backend knows how to extract text from.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "html", "htm"];

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionRequest {
    /// Upload a local document.
    File(PathBuf),
    /// Ask the backend to fetch and convert a web page.
    Url(Url),
}

impl ConversionRequest {
    /// Validate a URL submission.
    ///
    /// The input is trimmed and must parse as an absolute `http`/`https` URL.
    pub fn url(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        let url = Url::parse(input).map_err(|e| ValidationError::InvalidUrl {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl {
                input: input.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(ConversionRequest::Url(url))
    }

    /// Validate a file submission: it must exist, be readable, and carry a
    /// supported extension.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ValidationError::NoFileSelected);
        }
        let path = path.to_path_buf();

        if !path.is_file() {
            return Err(ValidationError::FileNotFound { path });
        }

        match std::fs::File::open(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ValidationError::PermissionDenied { path });
            }
            Err(_) => return Err(ValidationError::FileNotFound { path }),
        }

        if !has_supported_extension(&path) {
            return Err(ValidationError::UnsupportedFileType { path });
        }

        debug!("Validated local document: {}", path.display());
        Ok(ConversionRequest::File(path))
    }

    /// Resolve a CLI-style input: URLs by prefix, everything else as a path.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if is_url(input.trim()) {
            Self::url(input)
        } else {
            Self::file(input.trim())
        }
    }

    /// Status line shown while the request is in flight.
    pub fn uploading_status(&self) -> &'static str {
        match self {
            ConversionRequest::File(_) => "Uploading file...",
            ConversionRequest::Url(_) => "Fetching URL...",
        }
    }
}

impl std::fmt::Display for ConversionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionRequest::File(p) => write!(f, "{}", p.display()),
            ConversionRequest::Url(u) => write!(f, "{u}"),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
