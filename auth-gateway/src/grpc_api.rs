//! gRPC transport (component I, tonic side).
//!
//! `tonic::service::Interceptor` is synchronous and can't drive the async
//! Redis calls rate limiting and service authentication need, so the
//! pipeline stages [`crate::middleware`] applies as axum layers on the HTTP
//! side are applied here as one async helper called at the top of every RPC
//! method, in the same order: metadata extraction, rate limiting, service
//! authentication, then the handler call, with structured logging wrapping
//! the whole thing.

use crate::endpoints::*;
use crate::handler::RequestContext;
use crate::state::AppState;
use auth_protocol::auth::auth_service_server::AuthService;
use auth_protocol::auth::{
    AccessTokenPayload, AuthenticateRequest, AuthenticateResponse, Credential,
    GetSiwePayloadRequest, GetSiwePayloadResponse, RefreshAccessTokenRequest,
    RefreshAccessTokenResponse, RevokeRefreshTokensRequest, RevokeRefreshTokensResponse, Session,
    VerifyAccessTokenRequest, VerifyAccessTokenResponse,
};
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

pub struct AuthServiceImpl {
    state: Arc<AppState>,
}

impl AuthServiceImpl {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

fn metadata_str<'a, T>(request: &'a Request<T>, key: &str) -> Option<&'a str> {
    request.metadata().get(key).and_then(|v| v.to_str().ok())
}

/// Metadata extraction, rate limiting and service authentication, mirroring
/// `middleware.rs`'s axum stages in the same order. Returns the populated
/// [`RequestContext`], or a [`Status`] if the request is rejected outright
/// (only the rate limiter rejects outright; service authentication never
/// does — it demotes to anonymous).
async fn run_pipeline<T>(
    state: &AppState,
    request: &Request<T>,
    endpoint: &str,
) -> Result<RequestContext, Status> {
    let user_agent = metadata_str(request, "user-agent")
        .or_else(|| metadata_str(request, "grpcgateway-user-agent"))
        .unwrap_or_default()
        .to_string();
    let client_ip = metadata_str(request, "x-forwarded-for")
        .map(|ip| ip.split(',').next().unwrap_or(ip).trim().to_string());
    let service_auth_header = metadata_str(request, "x-service-authentication").map(str::to_string);

    let mut ctx = RequestContext {
        user_agent,
        client_ip: client_ip.clone().unwrap_or_default(),
        authenticated_service: None,
    };

    let policy = state.rate_limits.lookup(endpoint).clone();
    let result = state
        .rate_limits
        .check(state.cache.as_ref(), &policy, client_ip.as_deref())
        .await
        .map_err(|err| match err {
            auth_store::RateLimitError::MissingClientIp => {
                Status::invalid_argument(crate::error::MISSING_X_FORWARDED_FOR_ERROR)
            }
            _ => Status::internal(crate::error::INTERNAL_SERVER_ERROR),
        })?;
    if result.reached {
        return Err(Status::resource_exhausted(crate::error::RATE_LIMIT_EXCEEDED_ERROR));
    }

    if let Some(header_value) = service_auth_header {
        match crate::service_auth::authenticate(&state.service_auth_config, state.cache.as_ref(), &header_value)
            .await
        {
            Some(service) => ctx.authenticated_service = Some(service),
            None => warn!("service authentication failed, proceeding anonymously"),
        }
    }

    Ok(ctx)
}

fn log_request(method: &str, started: Instant, status: &str) {
    info!(method, status, latency_ms = started.elapsed().as_millis(), "grpc request handled");
}

fn authorization_header<T>(request: &Request<T>) -> Option<&str> {
    metadata_str(request, "authorization")
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn get_siwe_payload(
        &self,
        request: Request<GetSiwePayloadRequest>,
    ) -> Result<Response<GetSiwePayloadResponse>, Status> {
        let started = Instant::now();
        run_pipeline(&self.state, &request, GET_SIWE_PAYLOAD_RPC).await?;
        let req = request.into_inner();

        let payload = self
            .state
            .handler
            .get_siwe_payload(&req.domain, &req.uri, req.chain_id, &req.wallet_address)
            .await
            .map_err(|err| {
                log_request("GetSIWEPayload", started, "error");
                Status::from(err)
            })?;

        log_request("GetSIWEPayload", started, "ok");
        Ok(Response::new(GetSiwePayloadResponse {
            message: payload.message,
            nonce: payload.nonce,
            wallet_address: payload.wallet_address,
            issued_at: payload.issued_at.to_rfc3339(),
            expires_at: payload.expires_at.to_rfc3339(),
        }))
    }

    async fn authenticate(
        &self,
        request: Request<AuthenticateRequest>,
    ) -> Result<Response<AuthenticateResponse>, Status> {
        let started = Instant::now();
        let ctx = run_pipeline(&self.state, &request, AUTHENTICATE_RPC).await?;
        let req = request.into_inner();

        let (credential, session) = self
            .state
            .handler
            .authenticate(&ctx, &req.wallet_address, &req.user_id, &req.signature)
            .await
            .map_err(|err| {
                log_request("Authenticate", started, "error");
                Status::from(err)
            })?;

        log_request("Authenticate", started, "ok");
        Ok(Response::new(AuthenticateResponse {
            credential: Some(Credential {
                id: credential.id.to_string(),
                user_id: credential.user_id.to_string(),
                wallet_address: credential.wallet_address,
                created_at: credential.created_at.to_rfc3339(),
            }),
            session: Some(Session {
                session_id: session.session_id.to_string(),
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                access_exp: session.access_exp.to_rfc3339(),
                refresh_exp: session.refresh_exp.to_rfc3339(),
                token_type: session.token_type.to_string(),
            }),
        }))
    }

    async fn verify_access_token(
        &self,
        request: Request<VerifyAccessTokenRequest>,
    ) -> Result<Response<VerifyAccessTokenResponse>, Status> {
        let started = Instant::now();
        run_pipeline(&self.state, &request, VERIFY_ACCESS_TOKEN_RPC).await?;
        let authorization = authorization_header(&request).map(str::to_string);
        let req = request.into_inner();

        let payload = self
            .state
            .handler
            .verify_access_token(authorization.as_deref(), &req.user_id)
            .map_err(|err| {
                log_request("VerifyAccessToken", started, "error");
                Status::from(err)
            })?;

        log_request("VerifyAccessToken", started, "ok");
        Ok(Response::new(VerifyAccessTokenResponse {
            access_token_payload: Some(AccessTokenPayload {
                id: payload.id.to_string(),
                user_id: payload.user_id.to_string(),
                wallet_address: payload.wallet_address,
                role: payload.role.to_string(),
                issued_at: payload.issued_at.to_rfc3339(),
                expires_at: payload.expires_at.to_rfc3339(),
            }),
        }))
    }

    async fn refresh_access_token(
        &self,
        request: Request<RefreshAccessTokenRequest>,
    ) -> Result<Response<RefreshAccessTokenResponse>, Status> {
        let started = Instant::now();
        run_pipeline(&self.state, &request, REFRESH_ACCESS_TOKEN_RPC).await?;
        let authorization = authorization_header(&request).map(str::to_string);
        let req = request.into_inner();

        let session = self
            .state
            .handler
            .refresh_access_token(authorization.as_deref(), &req.user_id, &req.wallet_address)
            .await
            .map_err(|err| {
                log_request("RefreshAccessToken", started, "error");
                Status::from(err)
            })?;

        log_request("RefreshAccessToken", started, "ok");
        Ok(Response::new(RefreshAccessTokenResponse {
            session: Some(Session {
                session_id: session.session_id.to_string(),
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                access_exp: session.access_exp.to_rfc3339(),
                refresh_exp: session.refresh_exp.to_rfc3339(),
                token_type: session.token_type.to_string(),
            }),
        }))
    }

    async fn revoke_refresh_tokens(
        &self,
        request: Request<RevokeRefreshTokensRequest>,
    ) -> Result<Response<RevokeRefreshTokensResponse>, Status> {
        let started = Instant::now();
        run_pipeline(&self.state, &request, REVOKE_REFRESH_TOKENS_RPC).await?;
        let authorization = authorization_header(&request).map(str::to_string);
        let req = request.into_inner();

        let num_sessions_revoked = self
            .state
            .handler
            .revoke_refresh_tokens(authorization.as_deref(), &req.user_id)
            .await
            .map_err(|err| {
                log_request("RevokeRefreshTokens", started, "error");
                Status::from(err)
            })?;

        log_request("RevokeRefreshTokens", started, "ok");
        Ok(Response::new(RevokeRefreshTokensResponse {
            num_sessions_revoked: num_sessions_revoked as i64,
        }))
    }
}
