//! HTTP transport (component I, axum side).
//!
//! Maps the five auth RPCs onto REST-ish JSON endpoints, sharing the same
//! [`crate::handler::Handler`] business logic the gRPC transport uses.
//! [`RequestContext`] arrives already populated in request extensions by
//! [`crate::middleware::extract_metadata`] and
//! [`crate::middleware::service_authentication`].

use crate::error::GatewayError;
use crate::handler::{RequestContext, SessionView};
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/siwe-payload", get(get_siwe_payload))
        .route("/auth/authenticate", post(authenticate))
        .route("/auth/verify-access-token", post(verify_access_token))
        .route("/auth/refresh-access-token", post(refresh_access_token))
        .route("/auth/revoke-refresh-tokens", post(revoke_refresh_tokens))
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health() -> &'static str {
    "ok"
}

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization").and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
pub struct SiwePayloadQuery {
    pub wallet_address: String,
    pub domain: String,
    pub uri: String,
    pub chain_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SiwePayloadBody {
    pub message: String,
    pub nonce: String,
    pub wallet_address: String,
    pub issued_at: String,
    pub expires_at: String,
}

async fn get_siwe_payload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SiwePayloadQuery>,
) -> Result<Json<SiwePayloadBody>, GatewayError> {
    let payload = state
        .handler
        .get_siwe_payload(&query.domain, &query.uri, query.chain_id, &query.wallet_address)
        .await?;

    Ok(Json(SiwePayloadBody {
        message: payload.message,
        nonce: payload.nonce,
        wallet_address: payload.wallet_address,
        issued_at: payload.issued_at.to_rfc3339(),
        expires_at: payload.expires_at.to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuthenticateBody {
    pub wallet_address: String,
    pub user_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct CredentialBody {
    pub id: String,
    pub user_id: String,
    pub wallet_address: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub session_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_exp: String,
    pub refresh_exp: String,
    pub token_type: String,
}

fn session_body(session: SessionView) -> SessionBody {
    SessionBody {
        session_id: session.session_id.to_string(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        access_exp: session.access_exp.to_rfc3339(),
        refresh_exp: session.refresh_exp.to_rfc3339(),
        token_type: session.token_type.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct AuthenticateResponseBody {
    pub credential: CredentialBody,
    pub session: SessionBody,
}

async fn authenticate(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<AuthenticateBody>,
) -> Result<Json<AuthenticateResponseBody>, GatewayError> {
    let (credential, session) = state
        .handler
        .authenticate(&ctx, &body.wallet_address, &body.user_id, &body.signature)
        .await?;

    crate::metrics::record_auth_event("authenticate");

    Ok(Json(AuthenticateResponseBody {
        credential: CredentialBody {
            id: credential.id.to_string(),
            user_id: credential.user_id.to_string(),
            wallet_address: credential.wallet_address,
            created_at: credential.created_at.to_rfc3339(),
        },
        session: session_body(session),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyAccessTokenBody {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenPayloadBody {
    pub id: String,
    pub user_id: String,
    pub wallet_address: String,
    pub role: String,
    pub issued_at: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyAccessTokenResponseBody {
    pub access_token_payload: AccessTokenPayloadBody,
}

async fn verify_access_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyAccessTokenBody>,
) -> Result<Json<VerifyAccessTokenResponseBody>, GatewayError> {
    let payload = state
        .handler
        .verify_access_token(authorization_header(&headers), &body.user_id)?;

    Ok(Json(VerifyAccessTokenResponseBody {
        access_token_payload: AccessTokenPayloadBody {
            id: payload.id.to_string(),
            user_id: payload.user_id.to_string(),
            wallet_address: payload.wallet_address,
            role: payload.role.to_string(),
            issued_at: payload.issued_at.to_rfc3339(),
            expires_at: payload.expires_at.to_rfc3339(),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshAccessTokenBody {
    pub user_id: String,
    pub wallet_address: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshAccessTokenResponseBody {
    pub session: SessionBody,
}

async fn refresh_access_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RefreshAccessTokenBody>,
) -> Result<Json<RefreshAccessTokenResponseBody>, GatewayError> {
    let session = state
        .handler
        .refresh_access_token(authorization_header(&headers), &body.user_id, &body.wallet_address)
        .await?;

    Ok(Json(RefreshAccessTokenResponseBody {
        session: session_body(session),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRefreshTokensBody {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeRefreshTokensResponseBody {
    pub num_sessions_revoked: u64,
}

async fn revoke_refresh_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RevokeRefreshTokensBody>,
) -> Result<Json<RevokeRefreshTokensResponseBody>, GatewayError> {
    let num_sessions_revoked = state
        .handler
        .revoke_refresh_tokens(authorization_header(&headers), &body.user_id)
        .await?;

    crate::metrics::record_token_revocation();

    Ok(Json(RevokeRefreshTokensResponseBody { num_sessions_revoked }))
}
