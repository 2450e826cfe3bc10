//! docket-server
//!
//! HTTP boundary of the broker on axum. Handlers are thin: decode JSON, call one
//! `Broker` operation, encode the result or map the error.

pub mod config;
pub mod error;
pub mod observability;
pub mod router;
pub mod routes;
pub mod state;

pub use self::config::ServerConfig;
pub use self::router::build_router;
pub use self::state::AppState;
