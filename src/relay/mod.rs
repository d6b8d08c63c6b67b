//! Forwarding core.
//!
//! # Data Flow
//! ```text
//! InboundRequest + ForwardSpec
//!     → streaming.rs (stream or buffer, decided once)
//!     → security::headers (outbound header set)
//!     → builder.rs (method, URL, body)
//!     → net::client_pool (client for this execution context)
//!     → forwarder.rs (send, then buffer or stream)
//!     → RelayResult, or error.rs envelope on failure
//! ```
//!
//! # Design Decisions
//! - One engine for every route; routes only choose a path and an optional body
//! - Upstream payloads are never interpreted or rewritten
//! - No retries: a failure is relayed as-is

pub mod builder;
pub mod error;
pub mod forwarder;
pub mod inbound;
pub mod streaming;

pub use error::{ErrorEnvelope, ErrorKind, RelayError};
pub use forwarder::{ChunkStream, RelayForwarder, RelayResult};
pub use inbound::{ForwardSpec, InboundRequest};
pub use streaming::{StreamDecision, StreamTrigger};
