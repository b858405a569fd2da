//! Auth gateway library.
//!
//! Wires SIWE wallet authentication and service-to-service authentication
//! behind one transport-agnostic [`handler::Handler`], exposed over both
//! axum (HTTP) and tonic (gRPC).

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod authz;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod grpc_api;
pub mod handler;
pub mod http_api;
pub mod metrics;
pub mod middleware;
pub mod service_auth;
pub mod state;

pub use state::AppState;
