//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum app, middleware)
//!     → request.rs (request ID)
//!     → [routing table picks frontend]
//!     → forward.rs (breaker, balancer, rewrite, send)
//!     → websocket.rs (upgrade tunnel, wrr backends only)
//!     → response.rs (error mapping, header cleanup)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::{ForwardContext, Forwarder};
pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::{build_app, AppSettings};
