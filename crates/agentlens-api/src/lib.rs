//! The HTTP gateway for AgentLens: ingestion, query, replay, live
//! stream, OTLP receiver, compliance/export, and config endpoints
//! (spec §6), grounded on `vex-api`'s crate layout (state, error,
//! middleware, auth, server, routes) but with JWT swapped for bearer
//! API-key auth and GCRA swapped for the spec's fixed-window limiter.

pub mod auth;
pub mod bus;
pub mod error;
pub mod middleware;
pub mod rate_limiter;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{ServerConfig, ServerHandle};
pub use state::AppState;
