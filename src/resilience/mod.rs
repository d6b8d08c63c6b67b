//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (one end-to-end deadline around sending)
//!     → on failure: relay::error maps to 502/503/504
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every outbound call has a deadline
//! - Single attempt: failures are relayed, never retried

pub mod timeouts;

pub use timeouts::Deadline;
