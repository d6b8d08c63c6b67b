//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Local path (/v1/...)
//!     → router.rs (family lookup, /v1 stripped)
//!     → matcher.rs (segment-aware prefix test)
//!     → Return: RouteMatch or None (404)
//! ```
//!
//! # Design Decisions
//! - The family table is `const`, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same family

pub mod matcher;
pub mod router;

pub use matcher::PathMatch;
pub use router::{resolve, BodyMode, RouteFamily, RouteMatch, ROUTE_FAMILIES};
