//! Upload intake subsystem.
//!
//! # Data Flow
//! ```text
//! multipart body
//!     → intake.rs (iterate parts; text parts become fields)
//!     → filter.rs (field name → MIME type → count → size, per file part)
//!     → UploadBatch (buffered files + text fields)
//!     → relay handler
//! ```
//!
//! # Design Decisions
//! - Size is enforced while streaming, an oversize file is never fully buffered
//! - The first violation aborts the whole request
//! - Files live in memory for the duration of one request only

pub mod filter;
pub mod intake;

pub use filter::{UploadError, UploadFilter};
pub use intake::{intake, UploadBatch, UploadedFile};
