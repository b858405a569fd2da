//! Auth Store
//!
//! Persistence and cache-backed infrastructure for the auth service:
//! - [`cache::Cache`] — key-value store abstraction (Redis-backed in
//!   production, in-memory for tests).
//! - [`rate_limit::RateLimitRegistry`] — distributed rate limiting keyed on
//!   endpoint and client IP.
//! - [`siwe`] — Sign-In-With-Ethereum challenge generation and consumption.
//! - [`postgres::Database`] — credential and session persistence, behind
//!   the transport-agnostic [`store::Store`] trait ([`store::InMemoryStore`]
//!   is a test double with the same uniqueness invariants).

pub mod cache;
pub mod models;
pub mod postgres;
pub mod rate_limit;
pub mod siwe;
pub mod store;

pub use cache::{Cache, CacheError, InMemoryCache, RedisCache, RedisCacheConfig};
pub use models::{Credential, NewCredential, NewSession, Session};
pub use postgres::{Database, DbConfig, DbError};
pub use rate_limit::{default_rate_limit, Rate, RateLimitError, RateLimitRegistry, RateLimitResult};
pub use siwe::{Chain, SiweConfig, SiweError, SiwePayload};
pub use store::{InMemoryStore, Store};
