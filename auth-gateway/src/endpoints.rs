//! Endpoint key constants shared by the rate-limit registry, the HTTP
//! router and the gRPC service impl (component D/I wiring).
//!
//! gRPC keys are the full method path tonic routes on; HTTP keys are
//! `METHOD:/path`, matching [`crate::middleware::rate_limit`]'s
//! `endpoint_key`.

pub const GET_SIWE_PAYLOAD_RPC: &str = "/auth.v1.AuthService/GetSIWEPayload";
pub const AUTHENTICATE_RPC: &str = "/auth.v1.AuthService/Authenticate";
pub const VERIFY_ACCESS_TOKEN_RPC: &str = "/auth.v1.AuthService/VerifyAccessToken";
pub const REFRESH_ACCESS_TOKEN_RPC: &str = "/auth.v1.AuthService/RefreshAccessToken";
pub const REVOKE_REFRESH_TOKENS_RPC: &str = "/auth.v1.AuthService/RevokeRefreshTokens";

pub const GET_SIWE_PAYLOAD_HTTP: &str = "GET:/auth/siwe-payload";
pub const AUTHENTICATE_HTTP: &str = "POST:/auth/authenticate";
pub const VERIFY_ACCESS_TOKEN_HTTP: &str = "POST:/auth/verify-access-token";
pub const REFRESH_ACCESS_TOKEN_HTTP: &str = "POST:/auth/refresh-access-token";
pub const REVOKE_REFRESH_TOKENS_HTTP: &str = "POST:/auth/revoke-refresh-tokens";
