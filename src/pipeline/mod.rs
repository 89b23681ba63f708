//! Pipeline stages between the transport and the display.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ parser ──▶ frame ──▶ assembler ──▶ scheduler ──▶ observer
//! (HTTP)    (lines)    (JSON)    (append)      (pacing)      (display)
//! ```
//!
//! 1. [`parser`]    — split arbitrarily-fragmented bytes into `data:` records
//! 2. [`frame`]     — decode each record into a [`frame::Frame`]
//! 3. [`assembler`] — append chunks to the session's document
//! 4. [`scheduler`] — bound how often the snapshot is re-rendered
//!
//! The session ([`crate::session`]) owns one instance of each and is the
//! only thing that moves data between them.

pub mod assembler;
pub mod frame;
pub mod parser;
pub mod scheduler;
