//! Error types for the markstream library.
//!
//! Failures fall into four families, each with a different blast radius:
//!
//! * [`ValidationError`] — the request is malformed (bad URL, no file).
//!   Raised synchronously before any network call; no session is created.
//!
//! * [`TransportError`] — the connection failed, the upload was rejected, or
//!   the stream went silent or dropped. Ends the session as `Failed`, but the
//!   partial text accumulated so far is kept for display.
//!
//! * [`FrameDecodeError`] — one record on the wire could not be decoded.
//!   **Never fatal**: the parser logs it and moves on to the next record.
//!
//! * [`SessionError::Stream`] — the backend sent an explicit `error` frame.
//!   Authoritative: the session ends as `Failed`.
//!
//! [`MarkstreamError`] wraps all of these for the eager entry points in
//! [`crate::convert`], alongside configuration and output failures.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the markstream library.
#[derive(Debug, Error)]
pub enum MarkstreamError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The conversion request was rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Session errors ────────────────────────────────────────────────────
    /// The session reached `Failed`.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session was cancelled or superseded before it finished.
    #[error("Conversion was cancelled")]
    Cancelled,

    // ── Credential errors ─────────────────────────────────────────────────
    /// The backend has no stored API key, so no conversion may start.
    #[error(
        "No API key is configured on the conversion backend.\n\
         Provide one with --api-key <KEY>."
    )]
    ApiKeyMissing,

    /// A credential request to the backend failed.
    #[error("Credential request to '{url}' failed: {reason}")]
    CredentialRequestFailed { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for MarkstreamError {
    fn from(e: TransportError) -> Self {
        MarkstreamError::Session(SessionError::Transport(e))
    }
}

/// A conversion request that cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The URL field was empty or whitespace.
    #[error("Please enter a URL")]
    EmptyUrl,

    /// The input is not an absolute HTTP/HTTPS URL.
    #[error("Please enter a valid URL: '{input}' ({reason})")]
    InvalidUrl { input: String, reason: String },

    /// No file was chosen.
    #[error("No file selected")]
    NoFileSelected,

    /// The chosen file does not exist.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The backend only converts PDF, Word and HTML documents.
    #[error("Unsupported file type: '{path}'\nSupported: .pdf, .doc, .docx, .html, .htm")]
    UnsupportedFileType { path: PathBuf },
}

/// A failure of the connection carrying the frame stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection could not be opened.
    #[error("Failed to connect to '{url}': {reason}")]
    Connect { url: String, reason: String },

    /// The backend answered the upload/request with a non-success status.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    /// The stream broke or ended before a terminal frame arrived.
    #[error("Connection lost: {reason}")]
    Disconnected { reason: String },

    /// No fragment arrived within the idle window.
    #[error("No data received for {secs}s; the conversion timed out")]
    Timeout { secs: u64 },

    /// The request payload could not be prepared (e.g. the file vanished).
    #[error("Failed to prepare request: {0}")]
    Request(String),
}

/// A single undecodable record on the wire. Logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed frame record {record:?}: {reason}")]
pub struct FrameDecodeError {
    pub record: String,
    pub reason: String,
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Connection-level failure (see [`TransportError`]).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend reported an error via an `error` frame.
    #[error("{message}")]
    Stream { message: String },
}
