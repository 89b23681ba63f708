//! Frame model and wire-record decoding.
//!
//! The backend serialises every frame as a one-key JSON object:
//!
//! ```text
//! {"chunk": "<text>"}   → Frame::Chunk
//! {"done": true}        → Frame::Done
//! {"error": "<msg>"}    → Frame::Error
//! ```
//!
//! When a record carries more than one key, `chunk` wins over `done`, which
//! wins over `error`.

use crate::error::FrameDecodeError;
use serde::Deserialize;

/// One discrete unit of the backend's streamed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A fragment of the output document, to be appended.
    Chunk(String),
    /// The job completed successfully; no more frames follow.
    Done,
    /// The job failed; no more frames follow.
    Error(String),
}

impl Frame {
    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error(_))
    }
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    chunk: Option<String>,
    done: Option<bool>,
    error: Option<String>,
}

/// Decode one `data:` payload into a frame.
pub fn decode_record(payload: &str) -> Result<Frame, FrameDecodeError> {
    let record: WireRecord =
        serde_json::from_str(payload).map_err(|e| FrameDecodeError {
            record: payload.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(text) = record.chunk {
        return Ok(Frame::Chunk(text));
    }
    if record.done == Some(true) {
        return Ok(Frame::Done);
    }
    if let Some(message) = record.error {
        return Ok(Frame::Error(message));
    }

    Err(FrameDecodeError {
        record: payload.to_string(),
        reason: "record has none of `chunk`, `done: true`, `error`".to_string(),
    })
}
