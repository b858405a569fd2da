//! Auth Protocol Definitions
//!
//! Generated Rust code from Protocol Buffers.
//!
//! # Services
//! - `AuthService` — SIWE challenge/response, token verification, refresh, and revocation.

/// Auth service messages and client/server
pub mod auth {
    tonic::include_proto!("auth.v1");
}

pub use auth::auth_service_client::AuthServiceClient;
pub use auth::auth_service_server::{AuthService, AuthServiceServer};
pub use auth::{
    AccessTokenPayload, AuthenticateRequest, AuthenticateResponse, Credential,
    GetSiwePayloadRequest, GetSiwePayloadResponse, RefreshAccessTokenRequest,
    RefreshAccessTokenResponse, RevokeRefreshTokensRequest, RevokeRefreshTokensResponse, Session,
    VerifyAccessTokenRequest, VerifyAccessTokenResponse,
};
