//! Transport-agnostic storage interface (component H's collaborator).
//!
//! [`Database`](crate::postgres::Database) is the production implementation
//! backed by Postgres; [`InMemoryStore`] is a test double with the same
//! uniqueness invariants, letting the session/credential handler's
//! scenario tests run against in-process fakes rather than a live
//! Postgres instance.

use crate::models::{Credential, NewCredential, NewSession, Session};
use crate::postgres::{DbError, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Everything the session/credential handler needs from persistence.
/// `create_credential_and_session` is the one operation requiring
/// all-or-nothing atomicity: a failed session insert must not leave an
/// orphan credential behind.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_credential_by_wallet_address(&self, wallet_address: &str) -> Result<Option<Credential>>;

    async fn get_credential_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>>;

    async fn create_credential_and_session(
        &self,
        new_credential: NewCredential,
        new_session: NewSession,
    ) -> Result<(Credential, Session)>;

    async fn create_session(&self, new_session: NewSession) -> Result<Session>;

    async fn get_session_by_id(&self, id: Uuid) -> Result<Option<Session>>;

    async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64>;
}

/// In-process [`Store`] double. Enforces the same `user_id`/`wallet_address`
/// uniqueness the Postgres schema's unique constraints enforce, including
/// under concurrent writers (the whole check-then-insert happens under one
/// mutex acquisition, same as a Postgres unique index rejecting the loser of
/// a race).
#[derive(Default)]
pub struct InMemoryStore {
    inner: std::sync::Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    credentials: Vec<Credential>,
    sessions: Vec<Session>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_credential_by_wallet_address(&self, wallet_address: &str) -> Result<Option<Credential>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .credentials
            .iter()
            .find(|c| c.wallet_address == wallet_address)
            .cloned())
    }

    async fn get_credential_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>> {
        let state = self.inner.lock().unwrap();
        Ok(state.credentials.iter().find(|c| c.user_id == user_id).cloned())
    }

    async fn create_credential_and_session(
        &self,
        new_credential: NewCredential,
        new_session: NewSession,
    ) -> Result<(Credential, Session)> {
        let mut state = self.inner.lock().unwrap();
        if state
            .credentials
            .iter()
            .any(|c| c.user_id == new_credential.user_id || c.wallet_address == new_credential.wallet_address)
        {
            return Err(DbError::CredentialAlreadyExists);
        }

        let credential = Credential {
            id: Uuid::new_v4(),
            user_id: new_credential.user_id,
            wallet_address: new_credential.wallet_address,
            role: new_credential.role,
            created_at: chrono::Utc::now(),
        };
        let session = Session {
            id: new_session.id,
            user_id: new_session.user_id,
            wallet_address: new_session.wallet_address,
            refresh_token: new_session.refresh_token,
            user_agent: new_session.user_agent,
            client_ip: new_session.client_ip,
            is_revoked: false,
            expires_at: new_session.expires_at,
            created_at: chrono::Utc::now(),
        };

        state.credentials.push(credential.clone());
        state.sessions.push(session.clone());
        Ok((credential, session))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<Session> {
        let mut state = self.inner.lock().unwrap();
        let session = Session {
            id: new_session.id,
            user_id: new_session.user_id,
            wallet_address: new_session.wallet_address,
            refresh_token: new_session.refresh_token,
            user_agent: new_session.user_agent,
            client_ip: new_session.client_ip,
            is_revoked: false,
            expires_at: new_session.expires_at,
            created_at: chrono::Utc::now(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        let state = self.inner.lock().unwrap();
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut state = self.inner.lock().unwrap();
        let mut count = 0;
        for session in state.sessions.iter_mut().filter(|s| s.user_id == user_id && !s.is_revoked) {
            session.is_revoked = true;
            count += 1;
        }
        Ok(count)
    }
}
