//! PostgreSQL database operations for the auth service.
//!
//! Provides CRUD for credentials and sessions using SQLx, including the
//! transactional credential-then-session creation that keeps a failed
//! session mint from leaving an orphan credential behind.

use crate::models::{Credential, NewCredential, NewSession, Session};
use crate::store::Store;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("a credential already exists for this user or wallet")]
    CredentialAlreadyExists,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/auth".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Postgres-backed credential/session store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Unique constraint names raised by the `credentials` table, mapped to
/// [`DbError::CredentialAlreadyExists`] regardless of which one fired.
const CREDENTIALS_USER_ID_KEY: &str = "credentials_user_id_key";
const CREDENTIALS_WALLET_ADDRESS_KEY: &str = "credentials_wallet_address_key";

fn map_unique_violation(err: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(ref db_err) = err {
        if let Some(constraint) = db_err.constraint() {
            if constraint == CREDENTIALS_USER_ID_KEY || constraint == CREDENTIALS_WALLET_ADDRESS_KEY
            {
                return DbError::CredentialAlreadyExists;
            }
        }
    }
    DbError::Sqlx(err)
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await?;
        info!("connected to postgres");
        Ok(Self { pool })
    }

    /// Apply embedded migrations. Ambient schema management, not part of
    /// the hard components.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ===== Credentials =====

    #[instrument(skip(self))]
    pub async fn get_credential_by_wallet_address(
        &self,
        wallet_address: &str,
    ) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, user_id, wallet_address, role, created_at FROM credentials \
             WHERE wallet_address = $1",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    #[instrument(skip(self))]
    pub async fn get_credential_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, user_id, wallet_address, role, created_at FROM credentials \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    /// Insert a credential and its accompanying session in one transaction:
    /// if the session insert fails, the credential insert rolls back with
    /// it, so a failed token mint never leaves an orphan credential behind.
    ///
    /// A unique violation on `user_id` or `wallet_address` maps to
    /// [`DbError::CredentialAlreadyExists`] regardless of which column
    /// collided, matching the storage layer's job of enforcing "one
    /// credential per user, one per wallet" under concurrent writers.
    #[instrument(skip(self, new_credential, new_session))]
    async fn create_credential_and_session_impl(
        &self,
        new_credential: NewCredential,
        new_session: NewSession,
    ) -> Result<(Credential, Session)> {
        let mut tx = self.pool.begin().await?;

        let credential = sqlx::query_as::<_, Credential>(
            "INSERT INTO credentials (id, user_id, wallet_address, role, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             RETURNING id, user_id, wallet_address, role, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(new_credential.user_id)
        .bind(&new_credential.wallet_address)
        .bind(&new_credential.role)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions \
             (id, user_id, wallet_address, refresh_token, user_agent, client_ip, is_revoked, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, false, $7, NOW()) \
             RETURNING id, user_id, wallet_address, refresh_token, user_agent, client_ip, is_revoked, expires_at, created_at",
        )
        .bind(new_session.id)
        .bind(new_session.user_id)
        .bind(&new_session.wallet_address)
        .bind(&new_session.refresh_token)
        .bind(&new_session.user_agent)
        .bind(&new_session.client_ip)
        .bind(new_session.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((credential, session))
    }

    // ===== Sessions =====

    /// Standalone session creation outside of credential creation — used by
    /// `Authenticate` for an existing credential.
    #[instrument(skip(self))]
    async fn create_session_impl(&self, new_session: NewSession) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions \
             (id, user_id, wallet_address, refresh_token, user_agent, client_ip, is_revoked, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, false, $7, NOW()) \
             RETURNING id, user_id, wallet_address, refresh_token, user_agent, client_ip, is_revoked, expires_at, created_at",
        )
        .bind(new_session.id)
        .bind(new_session.user_id)
        .bind(&new_session.wallet_address)
        .bind(&new_session.refresh_token)
        .bind(&new_session.user_agent)
        .bind(&new_session.client_ip)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn get_session_by_id_impl(&self, id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, wallet_address, refresh_token, user_agent, client_ip, \
             is_revoked, expires_at, created_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Mark every session belonging to `user_id` as revoked, returning the
    /// number of rows actually flipped (sessions already revoked don't
    /// count again).
    #[instrument(skip(self))]
    async fn revoke_sessions_for_user_impl(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET is_revoked = true WHERE user_id = $1 AND is_revoked = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for Database {
    async fn get_credential_by_wallet_address(&self, wallet_address: &str) -> Result<Option<Credential>> {
        Database::get_credential_by_wallet_address(self, wallet_address).await
    }

    async fn get_credential_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>> {
        Database::get_credential_by_user_id(self, user_id).await
    }

    async fn create_credential_and_session(
        &self,
        new_credential: NewCredential,
        new_session: NewSession,
    ) -> Result<(Credential, Session)> {
        self.create_credential_and_session_impl(new_credential, new_session).await
    }

    async fn create_session(&self, new_session: NewSession) -> Result<Session> {
        self.create_session_impl(new_session).await
    }

    async fn get_session_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        self.get_session_by_id_impl(id).await
    }

    async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        self.revoke_sessions_for_user_impl(user_id).await
    }
}
