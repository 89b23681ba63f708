//! # markstream
//!
//! Stream a document or web page through a Markdown conversion backend and
//! assemble the generated text live, as it arrives.
//!
//! ## Why this crate?
//!
//! Converting a long article takes the backend tens of seconds, but it
//! starts emitting Markdown almost immediately. Showing that text as it
//! grows makes the wait feel short. The catch is the plumbing: bytes arrive
//! cut at arbitrary points, the display must not re-render on every one of
//! hundreds of tiny chunks, and a user who starts a second conversion must
//! never see the first one's late chunks bleed into it. This crate owns
//! that plumbing; the conversion itself happens on the backend.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file / URL
//!  │
//!  ├─ 1. Input      validate path or URL (no network on failure)
//!  ├─ 2. Backend    multipart upload or URL request → byte stream
//!  ├─ 3. Parser     bytes → `data:` records → Frame (chunk / done / error)
//!  ├─ 4. Assembler  append chunks in arrival order
//!  ├─ 5. Scheduler  render the snapshot at most once per tick
//!  └─ 6. Session    lifecycle, cancellation, identity guard, result
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use markstream::{convert, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let markdown = convert("https://example.com/article", &config).await?;
//!     println!("{markdown}");
//!     Ok(())
//! }
//! ```
//!
//! ## Live display
//!
//! ```rust,no_run
//! use markstream::{
//!     ClientConfig, ConversionObserver, ConversionRequest, HttpBackend, SessionSlot,
//! };
//! use std::sync::Arc;
//!
//! struct Screen;
//!
//! impl ConversionObserver for Screen {
//!     fn on_snapshot(&self, text: &str) {
//!         eprintln!("{} bytes so far", text.len());
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let backend = HttpBackend::new(&config)?;
//! let mut slot = SessionSlot::new();
//!
//! let request = ConversionRequest::url("https://example.com/article")?;
//! let mut session = slot.begin(request, &config, Arc::new(Screen));
//! let outcome = session.run(&backend).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | The `markstream` binary (clap, indicatif, tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{ConversionBackend, HttpBackend};
pub use config::{ClientConfig, ClientConfigBuilder, RenderPolicy};
pub use convert::{convert, convert_sync, convert_to_file, convert_with};
pub use error::{FrameDecodeError, MarkstreamError, SessionError, TransportError, ValidationError};
pub use input::ConversionRequest;
pub use pipeline::assembler::Assembler;
pub use pipeline::frame::Frame;
pub use pipeline::parser::{frames, idle_timeout, ByteStream, FrameParser, FrameStream};
pub use pipeline::scheduler::RenderScheduler;
pub use progress::{ConversionObserver, NoopObserver, ObserverRef};
pub use session::{
    ConversionSession, LiveGuard, SessionHandle, SessionId, SessionOutcome, SessionSlot,
    SessionState,
};
