//! Tabletalk Gateway - HTTP Chat Endpoint
//!
//! Plumbing between HTTP callers and the engine core:
//!
//! ```text
//! POST /chat {"message": "..."}  ──►  Engine::process  ──►  {"response": <envelope>}
//! GET  /health                   ──►  liveness probe
//! ```
//!
//! The gateway adds no behavior of its own; retry semantics, error
//! containment and envelope packaging all live in `tabletalk-core`.

pub mod config;
pub mod error;
pub mod gateway;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{ChatRequest, ChatResponse, Gateway, GatewayState};

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port
pub const DEFAULT_PORT: u16 = 8000;
