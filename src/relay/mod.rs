//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! chat:        raw JSON body ───────────────────────────────┐
//! transcribe:  one audio file → multipart form (+ model) ───┤
//! notes:       text + images → notes.rs (system + user      ├→ client.rs (bearer, timeouts)
//!              message, images as data URIs) ───────────────┘        │
//!                                                                    ▼
//!                                              2xx → body passed through verbatim
//!                                              else → 500, detail only logged
//! ```
//!
//! # Design Decisions
//! - No retries; every upstream call has a connect and a total timeout
//! - Dropping the handler future cancels the upstream call
//! - No relay state survives a request

pub mod client;
pub mod handlers;
pub mod notes;

use std::fmt;

pub use client::{UpstreamClient, UpstreamError, UpstreamResponse};
pub use handlers::RelayState;

/// The three relayed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    Transcription,
    Notes,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::Transcription => "transcription",
            Operation::Notes => "notes",
        }
    }

    /// Fixed client-facing message when the upstream call fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::Chat => "Failed to get a response from the completions API",
            Operation::Transcription => "Failed to transcribe audio",
            Operation::Notes => "Failed to process notes",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
