//! Observer trait for session events.
//!
//! Inject an [`Arc<dyn ConversionObserver>`] when starting a session to
//! receive progress, live snapshots, and the terminal result. The display
//! layer implements this; the library never touches a screen.
//!
//! # Example
//!
//! ```rust
//! use markstream::ConversionObserver;
//! use std::sync::Mutex;
//!
//! struct LastSnapshot {
//!     text: Mutex<String>,
//! }
//!
//! impl ConversionObserver for LastSnapshot {
//!     fn on_snapshot(&self, text: &str) {
//!         *self.text.lock().unwrap() = text.to_string();
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by a live session as it moves through its lifecycle.
///
/// Every call is gated on the session still being the live one for its
/// view, so a superseded session never reaches the observer. All methods
/// have default no-op implementations.
pub trait ConversionObserver: Send + Sync {
    /// Progress update.
    ///
    /// # Arguments
    /// * `percent` — 0–100
    /// * `status`  — human-readable status line
    fn on_progress(&self, percent: u8, status: &str) {
        let _ = (percent, status);
    }

    /// The full accumulated text (not a diff), once per render.
    fn on_snapshot(&self, text: &str) {
        let _ = text;
    }

    /// The conversion finished; `text` is the final document.
    fn on_complete(&self, text: &str) {
        let _ = text;
    }

    /// The conversion failed. Exactly one call per failed session.
    fn on_error(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op observer for callers that only want the returned result.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Convenience alias for a shared observer.
pub type ObserverRef = Arc<dyn ConversionObserver>;
