//! Integration tests for the auth gateway
//!
//! Exercises the transport-agnostic `Handler` end to end against in-memory
//! fakes (no live Postgres/Redis), covering the SIWE -> authenticate ->
//! refresh -> revoke lifecycle and service-to-service replay protection.
//! Run with: cargo test --test integration_tests -p auth-gateway

use std::collections::HashMap;
use std::sync::Arc;

use auth_core::token::SYMMETRIC_KEY_LENGTH;
use auth_core::{Role, TokenMaker};
use auth_gateway::handler::{Handler, RequestContext};
use auth_gateway::service_auth::{self, ServiceAuthConfig};
use auth_store::siwe::default_chains;
use auth_store::{InMemoryCache, InMemoryStore, SiweConfig};
use k256::ecdsa::{SigningKey, VerifyingKey};
use p256::ecdsa::SigningKey as P256SigningKey;
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use tiny_keccak::Hasher;
use uuid::Uuid;

const WALLET_DOMAIN: &str = "localhost";
const WALLET_URI: &str = "http://localhost:3000/login";
const WALLET_CHAIN_ID: i64 = 2021;

fn siwe_config() -> SiweConfig {
    SiweConfig {
        service_name: "auth".to_string(),
        environment: "development".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        chains: default_chains(),
    }
}

fn handler(seed: u8) -> Handler {
    Handler {
        siwe_config: siwe_config(),
        cache: Arc::new(InMemoryCache::new()),
        store: Arc::new(InMemoryStore::new()),
        token_maker: TokenMaker::new(&[seed; SYMMETRIC_KEY_LENGTH]).unwrap(),
        access_token_duration: chrono::Duration::minutes(15),
        refresh_token_duration: chrono::Duration::hours(168),
    }
}

fn users_ctx() -> RequestContext {
    RequestContext {
        user_agent: "integration-test-agent".to_string(),
        client_ip: "10.10.0.1".to_string(),
        authenticated_service: Some("users".to_string()),
    }
}

struct Wallet {
    private_key: [u8; 32],
    address: String,
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = tiny_keccak::Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

fn wallet(seed: u8) -> Wallet {
    let private_key = [seed; 32];
    let signing_key = SigningKey::from_bytes((&private_key).into()).unwrap();
    let verifying_key = VerifyingKey::from(&signing_key);
    let encoded = verifying_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Wallet {
        private_key,
        address: format!("0x{}", hex::encode(&hash[12..])),
    }
}

fn sign_message(wallet: &Wallet, message: &str) -> String {
    let signed = auth_core::crypto::ethereum::sign_message(&wallet.private_key, message).unwrap();
    signed.trim_start_matches("0x").to_string()
}

// ============================================================================
// Scenario 1: SIWE round trip
// ============================================================================

#[tokio::test]
async fn siwe_round_trip_produces_well_formed_challenge() {
    let handler = handler(1);
    let wallet = wallet(21);

    let payload = handler
        .get_siwe_payload(WALLET_DOMAIN, WALLET_URI, WALLET_CHAIN_ID, &wallet.address)
        .await
        .unwrap();

    assert!(payload
        .message
        .starts_with(&format!("localhost wants you to sign in with your Ethereum account:\n{}\n", wallet.address)));
    assert!(payload.message.contains("Version: 1"));
    assert!(payload.message.contains("Chain ID: 2021"));
    assert_eq!(payload.nonce.len(), 8);
    assert_eq!((payload.expires_at - payload.issued_at).num_seconds(), 15 * 60);
}

// ============================================================================
// Scenario 2-3: Authenticate new credential, then replay is rejected
// ============================================================================

#[tokio::test]
async fn authenticate_creates_credential_and_replay_is_not_found() {
    let handler = handler(2);
    let wallet = wallet(22);
    let user_id = Uuid::new_v4();

    let challenge = handler
        .get_siwe_payload(WALLET_DOMAIN, WALLET_URI, WALLET_CHAIN_ID, &wallet.address)
        .await
        .unwrap();
    let signature = sign_message(&wallet, &challenge.message);

    let (credential, session) = handler
        .authenticate(&users_ctx(), &wallet.address, &user_id.to_string(), &signature)
        .await
        .unwrap();

    assert_eq!(credential.user_id, user_id);
    assert_eq!(session.token_type, "bearer");

    let err = handler
        .authenticate(&users_ctx(), &wallet.address, &user_id.to_string(), &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, auth_gateway::error::GatewayError::NotFound(_)));
}

// ============================================================================
// Scenario 4: Wrong user id on an existing credential
// ============================================================================

#[tokio::test]
async fn authenticate_with_wrong_user_id_on_existing_credential_is_denied() {
    let handler = handler(3);
    let wallet = wallet(23);
    let owner = Uuid::new_v4();

    let challenge = handler
        .get_siwe_payload(WALLET_DOMAIN, WALLET_URI, WALLET_CHAIN_ID, &wallet.address)
        .await
        .unwrap();
    handler
        .authenticate(&users_ctx(), &wallet.address, &owner.to_string(), &sign_message(&wallet, &challenge.message))
        .await
        .unwrap();

    let second_challenge = handler
        .get_siwe_payload(WALLET_DOMAIN, WALLET_URI, WALLET_CHAIN_ID, &wallet.address)
        .await
        .unwrap();
    let impostor = Uuid::new_v4();
    let err = handler
        .authenticate(
            &users_ctx(),
            &wallet.address,
            &impostor.to_string(),
            &sign_message(&wallet, &second_challenge.message),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, auth_gateway::error::GatewayError::PermissionDenied(_)));
}

// ============================================================================
// Scenario 5: Refresh then revoke
// ============================================================================

#[tokio::test]
async fn refresh_then_revoke_then_refresh_fails() {
    let handler = handler(4);
    let wallet = wallet(24);
    let user_id = Uuid::new_v4();

    let challenge = handler
        .get_siwe_payload(WALLET_DOMAIN, WALLET_URI, WALLET_CHAIN_ID, &wallet.address)
        .await
        .unwrap();
    let (_, session) = handler
        .authenticate(&users_ctx(), &wallet.address, &user_id.to_string(), &sign_message(&wallet, &challenge.message))
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
    assert!(matches!(err, auth_gateway::error::GatewayError::PermissionDenied(_)));
}

// ============================================================================
// Scenario 6: Service-authentication replay protection
// ============================================================================

fn service_auth_config(service: &str) -> ServiceAuthConfig {
    let signing_key = P256SigningKey::random(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    let private_pem = signing_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
    let public_pem = verifying_key.to_public_key_pem(LineEnding::LF).unwrap();

    let mut public_keys = HashMap::new();
    public_keys.insert(service.to_string(), vec![public_pem]);
    let mut private_keys = HashMap::new();
    private_keys.insert(service.to_string(), vec![private_pem]);

    ServiceAuthConfig::new(public_keys, private_keys)
}

#[tokio::test]
async fn service_authentication_token_cannot_be_replayed() {
    let config = service_auth_config("users");
    let cache = InMemoryCache::new();

    let payload = service_auth::generate_payload(&config, "users").unwrap();

    let first = service_auth::authenticate(&config, &cache, &payload).await;
    assert_eq!(first.as_deref(), Some("users"));

    let second = service_auth::authenticate(&config, &cache, &payload).await;
    assert_eq!(second, None, "a replayed signature must not re-attach an authenticated service identity");
}

// ============================================================================
// Role escape hatch: admins bypass user-id ownership
// ============================================================================

#[tokio::test]
async fn admin_token_bypasses_user_id_ownership_check() {
    let token_maker = TokenMaker::new(&[9u8; SYMMETRIC_KEY_LENGTH]).unwrap();
    let token_owner = Uuid::new_v4();
    let caller = Uuid::new_v4();

    let (token, _) = token_maker
        .create_token(
            token_owner,
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
            Role::Admin,
            auth_core::TokenType::Access,
            chrono::Duration::minutes(15),
        )
        .unwrap();
    let header = format!("bearer {token}");

    let payload = auth_gateway::authz::authorize(
        Some(&header),
        &token_maker,
        auth_core::TokenType::Access,
        None,
        caller,
    )
    .unwrap();
    assert_eq!(payload.user_id, token_owner);
}
