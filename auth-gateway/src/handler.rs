//! Session/credential handler (component H).
//!
//! Transport-agnostic business logic behind all five RPCs. Both the tonic
//! service impl and the axum HTTP handlers call into this struct; neither
//! transport's types appear here.

use crate::authz;
use crate::error::GatewayError;
use auth_core::crypto::ethereum;
use auth_core::{Role, TokenMaker, TokenType};
use auth_store::models::{NewCredential, NewSession};
use auth_store::{Cache, DbError, SiweConfig, SiweError, Store};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a request needs to identify the calling device, extracted by
/// the metadata-extraction middleware layer (component I, step 2).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_agent: String,
    pub client_ip: String,
    pub authenticated_service: Option<String>,
}

/// Only service known to this core at launch; every RPC but `GetSIWEPayload`
/// requires it.
const USERS_SERVICE: &str = "users";

pub struct SiwePayload {
    pub message: String,
    pub nonce: String,
    pub wallet_address: String,
    pub issued_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct CredentialView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub created_at: chrono::DateTime<Utc>,
}

pub struct SessionView {
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub access_exp: chrono::DateTime<Utc>,
    pub refresh_exp: chrono::DateTime<Utc>,
    pub token_type: &'static str,
}

pub struct AccessTokenPayloadView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub role: Role,
    pub issued_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Business logic shared by the gRPC and HTTP transports. Holds everything
/// components E through H need; owns no transport-specific state.
pub struct Handler {
    pub siwe_config: SiweConfig,
    pub cache: Arc<dyn Cache>,
    pub store: Arc<dyn Store>,
    pub token_maker: TokenMaker,
    pub access_token_duration: chrono::Duration,
    pub refresh_token_duration: chrono::Duration,
}

fn require_users_service(ctx: &RequestContext) -> Result<(), GatewayError> {
    match ctx.authenticated_service.as_deref() {
        Some(USERS_SERVICE) => Ok(()),
        _ => Err(GatewayError::unauthorized()),
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, GatewayError> {
    Uuid::parse_str(value).map_err(|_| GatewayError::invalid_argument(field, "must be a valid uuid"))
}

/// Validate `wallet_address` and `user_id` together, collecting every
/// violation instead of stopping at the first (§7: field validation never
/// short-circuits). Returns both parsed values only if neither is invalid.
fn validate_authenticate_fields(
    wallet_address: &str,
    user_id: &str,
) -> Result<(String, Uuid), GatewayError> {
    let mut violations = Vec::new();

    let normalized_wallet = auth_core::crypto::normalize_hex_string(wallet_address);
    if !ethereum::is_hex_address(&normalized_wallet) {
        violations.push(crate::error::FieldViolation {
            field: "wallet_address".to_string(),
            description: "must be a valid Ethereum address".to_string(),
        });
    }

    let parsed_user_id = Uuid::parse_str(user_id);
    if parsed_user_id.is_err() {
        violations.push(crate::error::FieldViolation {
            field: "user_id".to_string(),
            description: "must be a valid uuid".to_string(),
        });
    }

    if !violations.is_empty() {
        return Err(GatewayError::InvalidArgument(violations));
    }

    Ok((normalized_wallet, parsed_user_id.unwrap()))
}

impl Handler {
    pub async fn get_siwe_payload(
        &self,
        domain: &str,
        uri: &str,
        chain_id: i64,
        wallet_address: &str,
    ) -> Result<SiwePayload, GatewayError> {
        let payload = auth_store::siwe::generate_siwe_payload(
            &self.siwe_config,
            self.cache.as_ref(),
            domain,
            uri,
            chain_id,
            wallet_address,
        )
        .await
        .map_err(siwe_error_to_gateway)?;

        Ok(SiwePayload {
            message: payload.message,
            nonce: payload.nonce,
            wallet_address: payload.wallet_address,
            issued_at: payload.issued_at,
            expires_at: payload.expires_at,
        })
    }

    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        wallet_address: &str,
        user_id: &str,
        signature: &str,
    ) -> Result<(CredentialView, SessionView), GatewayError> {
        require_users_service(ctx)?;

        let (wallet_address, user_id) = validate_authenticate_fields(wallet_address, user_id)?;

        let message = auth_store::siwe::fetch_siwe_message(
            &self.siwe_config,
            self.cache.as_ref(),
            &wallet_address,
        )
        .await
        .map_err(siwe_error_to_gateway)?;

        let signature_bytes = decode_ethereum_signature(signature)?;
        let valid = ethereum::verify_signature(&wallet_address, &message, &signature_bytes)
            .map_err(|_| GatewayError::Unauthenticated(crate::error::SIGNATURE_VERIFICATION_ERROR))?;
        if !valid {
            return Err(GatewayError::Unauthenticated(crate::error::SIGNATURE_VERIFICATION_ERROR));
        }

        let existing = self
            .store
            .get_credential_by_wallet_address(&wallet_address)
            .await
            .map_err(db_error_to_gateway)?;

        match existing {
            None => self.create_credential_and_session(user_id, &wallet_address, ctx).await,
            Some(credential) => {
                if credential.user_id != user_id {
                    return Err(GatewayError::unauthorized());
                }
                let session = self
                    .mint_session(credential.id, user_id, &wallet_address, ctx)
                    .await?;
                Ok((credential_view(&credential), session))
            }
        }
    }

    async fn create_credential_and_session(
        &self,
        user_id: Uuid,
        wallet_address: &str,
        ctx: &RequestContext,
    ) -> Result<(CredentialView, SessionView), GatewayError> {
        let new_credential = NewCredential {
            user_id,
            wallet_address: wallet_address.to_string(),
            role: Role::User.to_string(),
        };

        let (refresh_token, refresh_payload) = self
            .token_maker
            .create_token(
                user_id,
                wallet_address,
                Role::User,
                TokenType::Refresh,
                self.refresh_token_duration,
            )
            .map_err(|_| GatewayError::internal())?;

        let new_session = NewSession {
            id: refresh_payload.id,
            user_id,
            wallet_address: wallet_address.to_string(),
            refresh_token,
            user_agent: ctx.user_agent.clone(),
            client_ip: ctx.client_ip.clone(),
            expires_at: refresh_payload.expires_at,
        };

        // One transaction: a failed session insert rolls the credential
        // insert back with it, so a mint failure never leaves an orphan
        // credential (see `Store::create_credential_and_session`).
        let (credential, session) = self
            .store
            .create_credential_and_session(new_credential, new_session)
            .await
            .map_err(db_error_to_gateway)?;

        let (access_token, _) = self
            .token_maker
            .create_token(
                credential.user_id,
                wallet_address,
                Role::User,
                TokenType::Access,
                self.access_token_duration,
            )
            .map_err(|_| GatewayError::internal())?;

        Ok((
            credential_view(&credential),
            SessionView {
                session_id: session.id,
                access_token,
                refresh_token: session.refresh_token,
                access_exp: Utc::now() + self.access_token_duration,
                refresh_exp: session.expires_at,
                token_type: "bearer",
            },
        ))
    }

    async fn mint_session(
        &self,
        _credential_id: Uuid,
        user_id: Uuid,
        wallet_address: &str,
        ctx: &RequestContext,
    ) -> Result<SessionView, GatewayError> {
        let (access_token, _) = self
            .token_maker
            .create_token(
                user_id,
                wallet_address,
                Role::User,
                TokenType::Access,
                self.access_token_duration,
            )
            .map_err(|_| GatewayError::internal())?;
        let (refresh_token, refresh_payload) = self
            .token_maker
            .create_token(
                user_id,
                wallet_address,
                Role::User,
                TokenType::Refresh,
                self.refresh_token_duration,
            )
            .map_err(|_| GatewayError::internal())?;

        let new_session = NewSession {
            id: refresh_payload.id,
            user_id,
            wallet_address: wallet_address.to_string(),
            refresh_token,
            user_agent: ctx.user_agent.clone(),
            client_ip: ctx.client_ip.clone(),
            expires_at: refresh_payload.expires_at,
        };
        let session = self
            .store
            .create_session(new_session)
            .await
            .map_err(db_error_to_gateway)?;

        Ok(SessionView {
            session_id: session.id,
            access_token,
            refresh_token: session.refresh_token,
            access_exp: Utc::now() + self.access_token_duration,
            refresh_exp: session.expires_at,
            token_type: "bearer",
        })
    }

    pub fn verify_access_token(
        &self,
        authorization_header: Option<&str>,
        user_id: &str,
    ) -> Result<AccessTokenPayloadView, GatewayError> {
        let user_id = parse_uuid("user_id", user_id)?;
        let payload = authz::authorize(
            authorization_header,
            &self.token_maker,
            TokenType::Access,
            Some(&[Role::User]),
            user_id,
        )?;

        Ok(AccessTokenPayloadView {
            id: payload.id,
            user_id: payload.user_id,
            wallet_address: payload.wallet_address,
            role: payload.role,
            issued_at: payload.issued_at,
            expires_at: payload.expires_at,
        })
    }

    pub async fn refresh_access_token(
        &self,
        authorization_header: Option<&str>,
        user_id: &str,
        wallet_address: &str,
    ) -> Result<SessionView, GatewayError> {
        let user_id_uuid = parse_uuid("user_id", user_id)?;
        let payload = authz::authorize(
            authorization_header,
            &self.token_maker,
            TokenType::Refresh,
            None,
            user_id_uuid,
        )?;

        let session = self
            .store
            .get_session_by_id(payload.id)
            .await
            .map_err(db_error_to_gateway)?
            .ok_or_else(GatewayError::unauthorized)?;

        if session.is_revoked {
            return Err(GatewayError::unauthorized());
        }

        let (access_token, _) = self
            .token_maker
            .create_token(
                user_id_uuid,
                wallet_address,
                payload.role,
                TokenType::Access,
                self.access_token_duration,
            )
            .map_err(|_| GatewayError::internal())?;

        Ok(SessionView {
            session_id: session.id,
            access_token,
            refresh_token: session.refresh_token,
            access_exp: Utc::now() + self.access_token_duration,
            refresh_exp: session.expires_at,
            token_type: "bearer",
        })
    }

    pub async fn revoke_refresh_tokens(
        &self,
        authorization_header: Option<&str>,
        user_id: &str,
    ) -> Result<u64, GatewayError> {
        let user_id_uuid = parse_uuid("user_id", user_id)?;
        authz::authorize(
            authorization_header,
            &self.token_maker,
            TokenType::Access,
            None,
            user_id_uuid,
        )?;

        self.store
            .revoke_sessions_for_user(user_id_uuid)
            .await
            .map_err(db_error_to_gateway)
    }
}

fn credential_view(credential: &auth_store::models::Credential) -> CredentialView {
    CredentialView {
        id: credential.id,
        user_id: credential.user_id,
        wallet_address: credential.wallet_address.clone(),
        created_at: credential.created_at,
    }
}

fn decode_ethereum_signature(signature: &str) -> Result<Vec<u8>, GatewayError> {
    let hex_part = signature.trim_start_matches("0x");
    hex::decode(hex_part).map_err(|_| GatewayError::invalid_argument("signature", "must be hex-encoded"))
}

fn siwe_error_to_gateway(err: SiweError) -> GatewayError {
    match err {
        SiweError::InvalidWalletAddress(_)
        | SiweError::UnsupportedChain(_)
        | SiweError::InvalidUri(_)
        | SiweError::HostnameMismatch
        | SiweError::UnsupportedScheme(_)
        | SiweError::DomainNotAllowed(_) => {
            GatewayError::invalid_argument("wallet_address", "invalid SIWE request")
        }
        SiweError::MessageNotFound => GatewayError::NotFound("no SIWE challenge found for this wallet"),
        SiweError::Cache(_) => GatewayError::internal(),
    }
}

fn db_error_to_gateway(err: DbError) -> GatewayError {
    match err {
        DbError::CredentialAlreadyExists => {
            GatewayError::invalid_argument("wallet_address", "a credential already exists for this user or wallet")
        }
        DbError::NotFound(_) => GatewayError::NotFound("resource not found"),
        DbError::Sqlx(_) | DbError::Migration(_) => GatewayError::internal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_core::token::SYMMETRIC_KEY_LENGTH;
    use auth_store::InMemoryCache;
    use auth_store::siwe::default_chains;

    fn siwe_config() -> SiweConfig {
        SiweConfig {
            service_name: "auth".to_string(),
            environment: "development".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            chains: default_chains(),
        }
    }

    #[tokio::test]
    async fn get_siwe_payload_builds_well_formed_message() {
        let handler_cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let token_maker = TokenMaker::new(&[1u8; SYMMETRIC_KEY_LENGTH]).unwrap();

        let payload = auth_store::siwe::generate_siwe_payload(
            &siwe_config(),
            handler_cache.as_ref(),
            "localhost",
            "http://localhost:3000/login",
            2021,
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
        )
        .await
        .unwrap();

        assert_eq!(payload.nonce.len(), 8);
        let _ = token_maker;
    }

    #[test]
    fn validate_authenticate_fields_rejects_malformed_wallet() {
        let err = validate_authenticate_fields("not an address", &Uuid::new_v4().to_string()).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(v) if v.len() == 1 && v[0].field == "wallet_address"));

        assert!(validate_authenticate_fields(
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
            &Uuid::new_v4().to_string(),
        )
        .is_ok());
    }

    #[test]
    fn validate_authenticate_fields_aggregates_both_violations() {
        let err = validate_authenticate_fields("not an address", "not a uuid").unwrap_err();
        match err {
            GatewayError::InvalidArgument(violations) => {
                assert_eq!(violations.len(), 2);
                let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
                assert!(fields.contains(&"wallet_address"));
                assert!(fields.contains(&"user_id"));
            }
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    // ===== Scenario tests (§8): Handler wired to in-process fakes, exactly
    // the "constructed Store double" + in-memory Cache the ambient test
    // tooling section promises. No live Postgres/Redis involved. =====

    fn test_handler() -> Handler {
        Handler {
            siwe_config: siwe_config(),
            cache: Arc::new(InMemoryCache::new()),
            store: Arc::new(auth_store::InMemoryStore::new()),
            token_maker: TokenMaker::new(&[2u8; SYMMETRIC_KEY_LENGTH]).unwrap(),
            access_token_duration: chrono::Duration::minutes(15),
            refresh_token_duration: chrono::Duration::hours(168),
        }
    }

    /// A throwaway secp256k1 keypair and the 0x-address it derives, so
    /// scenario tests can both request a SIWE challenge for a wallet and
    /// sign the returned message as that wallet.
    struct Wallet {
        private_key: [u8; 32],
        address: String,
    }

    fn test_wallet(seed: u8) -> Wallet {
        use k256::ecdsa::{SigningKey, VerifyingKey};
        let private_key = [seed; 32];
        let signing_key = SigningKey::from_bytes((&private_key).into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let uncompressed = &encoded.as_bytes()[1..];
        use tiny_keccak::Hasher;
        let mut hasher = tiny_keccak::Keccak::v256();
        let mut hash = [0u8; 32];
        hasher.update(uncompressed);
        hasher.finalize(&mut hash);
        Wallet {
            private_key,
            address: format!("0x{}", hex::encode(&hash[12..])),
        }
    }

    fn sign(wallet: &Wallet, message: &str) -> String {
        let signed = ethereum::sign_message(&wallet.private_key, message).unwrap();
        signed.trim_start_matches("0x").to_string()
    }

    fn service_ctx() -> RequestContext {
        RequestContext {
            user_agent: "test-agent".to_string(),
            client_ip: "10.0.0.1".to_string(),
            authenticated_service: Some("users".to_string()),
        }
    }

    async fn siwe_challenge(handler: &Handler, wallet: &Wallet) -> SiwePayload {
        handler
            .get_siwe_payload(
                "localhost",
                "http://localhost:3000/login",
                2021,
                &wallet.address,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn scenario_authenticate_new_credential() {
        let handler = test_handler();
        let wallet = test_wallet(11);
        let challenge = siwe_challenge(&handler, &wallet).await;
        let signature = sign(&wallet, &challenge.message);

        let user_id = Uuid::new_v4();
        let (credential, session) = handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature)
            .await
            .unwrap();

        assert_eq!(credential.user_id, user_id);
        assert_eq!(session.token_type, "bearer");
    }

    #[tokio::test]
    async fn scenario_replay_rejected_after_consume() {
        let handler = test_handler();
        let wallet = test_wallet(12);
        let challenge = siwe_challenge(&handler, &wallet).await;
        let signature = sign(&wallet, &challenge.message);
        let user_id = Uuid::new_v4();

        handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature)
            .await
            .unwrap();

        let err = handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn scenario_wrong_user_id_on_existing_credential_is_permission_denied() {
        let handler = test_handler();
        let wallet = test_wallet(13);
        let user_id = Uuid::new_v4();

        let challenge = siwe_challenge(&handler, &wallet).await;
        let signature = sign(&wallet, &challenge.message);
        handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature)
            .await
            .unwrap();

        let challenge2 = siwe_challenge(&handler, &wallet).await;
        let signature2 = sign(&wallet, &challenge2.message);
        let other_user = Uuid::new_v4();
        let err = handler
            .authenticate(&service_ctx(), &wallet.address, &other_user.to_string(), &signature2)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn scenario_authenticate_is_idempotent_on_credential_id() {
        let handler = test_handler();
        let wallet = test_wallet(16);
        let user_id = Uuid::new_v4();

        let challenge = siwe_challenge(&handler, &wallet).await;
        let signature = sign(&wallet, &challenge.message);
        let (first, _) = handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature)
            .await
            .unwrap();

        let challenge2 = siwe_challenge(&handler, &wallet).await;
        let signature2 = sign(&wallet, &challenge2.message);
        let (second, _) = handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature2)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.user_id, user_id);
    }

    #[tokio::test]
    async fn scenario_refresh_then_revoke() {
        let handler = test_handler();
        let wallet = test_wallet(14);
        let user_id = Uuid::new_v4();

        let challenge = siwe_challenge(&handler, &wallet).await;
        let signature = sign(&wallet, &challenge.message);
        let (_, session) = handler
            .authenticate(&service_ctx(), &wallet.address, &user_id.to_string(), &signature)
            .await
            .unwrap();

        let refresh_header = format!("bearer {}", session.refresh_token);
        let refreshed = handler
            .refresh_access_token(Some(&refresh_header), &user_id.to_string(), &wallet.address)
            .await
            .unwrap();
        assert_eq!(refreshed.refresh_token, session.refresh_token);
        assert_eq!(refreshed.refresh_exp, session.refresh_exp);

        let access_header = format!("bearer {}", refreshed.access_token);
        let revoked = handler
            .revoke_refresh_tokens(Some(&access_header), &user_id.to_string())
            .await
            .unwrap();
        assert_eq!(revoked, 1);

        let err = handler
            .refresh_access_token(Some(&refresh_header), &user_id.to_string(), &wallet.address)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn scenario_non_users_caller_is_rejected() {
        let handler = test_handler();
        let wallet = test_wallet(15);
        let challenge = siwe_challenge(&handler, &wallet).await;
        let signature = sign(&wallet, &challenge.message);

        let anonymous_ctx = RequestContext::default();
        let err = handler
            .authenticate(&anonymous_ctx, &wallet.address, &Uuid::new_v4().to_string(), &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied(_)));
    }
}
