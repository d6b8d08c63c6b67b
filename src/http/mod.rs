//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, generated if absent)
//!     → middleware/access_control.rs (local access key)
//!     → server.rs relay handler (route family, body validation)
//!     → [relay::RelayForwarder]
//!     → response.rs (RelayResult → buffered or streamed body)
//!     → Send to client
//! ```

pub mod discovery;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, ServerError};
