//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Every response:
//!     → headers.rs (hardening headers, unless the handler set them)
//!
//! API requests:
//!     → rate_limit.rs (per-client fixed window, 429 when exhausted)
//!     → upload filters (see crate::upload)
//!     → relay handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a rate-limit store failure rejects the request
//! - The rate-limit store is injected, never a global
//! - Forwarded client addresses are only trusted when configured

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{
    InMemoryStore, RateLimitDecision, RateLimitError, RateLimitState, RateLimitStore,
};
