//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (local access key, before anything else)
//!     → [relay handler]
//!     → headers.rs (outbound header set: credential swap, beta tokens)
//!
//! Upstream response:
//!     → headers.rs (strip hop-by-hop / length / encoding)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject before any upstream call
//! - No trust in client input: inbound headers are allow-listed, never merged
//! - The caller's credentials never reach upstream

pub mod access_control;
pub mod headers;

pub use access_control::{AuthDecision, AuthGate, UnauthorizedReason};
pub use headers::HeaderRewriter;
