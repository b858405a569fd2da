//! Persisted data model: credentials and sessions.
//!
//! A [`Credential`] is the permanent binding between a caller-assigned
//! `user_id` and an Ethereum wallet address; it is created once and never
//! mutated. A [`Session`] binds a refresh token to a device context and can
//! be revoked, but never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable (user_id, wallet_address) binding created on first successful
/// authentication for a wallet.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new credential. `role` defaults to `"user"`.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub user_id: Uuid,
    pub wallet_address: String,
    pub role: String,
}

/// A revocable refresh-token context tied to a device.
///
/// `id` equals the refresh token's own payload id, so looking up a session
/// by the id embedded in a refresh token is a direct primary-key read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub expires_at: DateTime<Utc>,
}
