//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware chain, routes)
//!     → request.rs (request ID)
//!     → security (headers, rate limit)
//!     → upload / relay handlers
//!     → response.rs (error mapping, upstream passthrough)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, MakeRequestUuidV4, X_REQUEST_ID};
pub use response::{ErrorBody, RelayError};
pub use server::HttpServer;
