//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Relay call
//!     → client_pool.rs (reqwest client for the execution context)
//!     → upstream connection (reqwest's own keep-alive pool)
//!
//! Execution context dropped:
//!     → entry goes stale → swept on the next acquire
//! ```
//!
//! # Design Decisions
//! - One client per execution context, never one per request
//! - Redirects are never followed
//! - Shutdown releases every client explicitly

pub mod client_pool;

pub use client_pool::{ClientHandle, ClientPool, ClientSettings, ContextKey, ExecutionContext};
