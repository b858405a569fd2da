//! HTTP middleware pipeline (component I).
//!
//! Nested in call order so that, outermost first: CORS, metadata extraction,
//! rate limiter, structured logger, service authentication, handler. Each
//! stage is an `axum::middleware::from_fn_with_state` layer; the gRPC
//! transport applies the same four stages as tonic interceptors in
//! `grpc_api.rs`, in the same order.

use crate::handler::RequestContext;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";
const HEADER_X_SERVICE_AUTHENTICATION: &str = "x-service-authentication";
const HEADER_USER_AGENT: &str = "user-agent";
const HEADER_GRPCGATEWAY_USER_AGENT: &str = "grpcgateway-user-agent";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Distinct extension newtypes for two `Option<String>`-shaped values that
/// would otherwise collide: axum's `Extensions` is keyed by type, so
/// inserting a bare `Option<String>` twice overwrites the first with the
/// second regardless of what either one holds.
#[derive(Clone)]
struct ClientIp(Option<String>);
#[derive(Clone)]
struct ServiceAuthHeader(Option<String>);

/// Reads `user-agent`/`grpcgateway-user-agent`, `x-forwarded-for`, and
/// `x-service-authentication` and binds a [`RequestContext`] into the
/// request's extensions for downstream stages.
pub async fn extract_metadata(mut request: Request, next: Next) -> Response {
    let headers = request.headers();

    let user_agent = header_str(headers, HEADER_USER_AGENT)
        .or_else(|| header_str(headers, HEADER_GRPCGATEWAY_USER_AGENT))
        .unwrap_or_default()
        .to_string();

    let client_ip = header_str(headers, HEADER_X_FORWARDED_FOR)
        .map(|ip| ip.split(',').next().unwrap_or(ip).trim().to_string());

    let service_auth_header = header_str(headers, HEADER_X_SERVICE_AUTHENTICATION).map(str::to_string);

    request.extensions_mut().insert(RequestContext {
        user_agent,
        client_ip: client_ip.clone().unwrap_or_default(),
        authenticated_service: None,
    });
    request.extensions_mut().insert(ClientIp(client_ip));
    request.extensions_mut().insert(ServiceAuthHeader(service_auth_header));

    next.run(request).await
}

/// Endpoint key for the rate-limit registry, HTTP style: `METHOD:/path`.
fn endpoint_key(request: &Request) -> String {
    format!("{}:{}", request.method(), request.uri().path())
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip: Option<String> = request.extensions().get::<ClientIp>().and_then(|ip| ip.0.clone());
    let key = endpoint_key(&request);
    let policy = state.rate_limits.lookup(&key).clone();

    let result = match state
        .rate_limits
        .check(state.cache.as_ref(), &policy, client_ip.as_deref())
        .await
    {
        Ok(result) => result,
        Err(auth_store::RateLimitError::MissingClientIp) => {
            return crate::error::GatewayError::invalid_argument(
                "x-forwarded-for",
                crate::error::MISSING_X_FORWARDED_FOR_ERROR,
            )
            .into_response();
        }
        Err(_) => return crate::error::GatewayError::internal().into_response(),
    };

    if result.reached {
        return apply_rate_limit_headers(
            crate::error::GatewayError::ResourceExhausted(crate::error::RATE_LIMIT_EXCEEDED_ERROR)
                .into_response(),
            &result,
        );
    }

    request.extensions_mut().insert(result);
    let response = next.run(request).await;
    apply_rate_limit_headers(response, &result)
}

fn apply_rate_limit_headers(mut response: Response, result: &auth_store::RateLimitResult) -> Response {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", result.limit.into());
    headers.insert("x-ratelimit-remaining", result.remaining.into());
    headers.insert("x-ratelimit-reset", result.reset_seconds.into());
    response
}

/// Records method, status and latency as structured fields — never string
/// interpolation — per request.
pub async fn structured_logger(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis();
    info!(method = %method, path = %path, status, latency_ms, "request handled");

    response
}

/// Verifies `x-service-authentication` if present and attaches
/// `authenticated_service` to the [`RequestContext`]; never rejects on its
/// own — failures demote the request to anonymous (§4.F).
pub async fn service_authentication(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value: Option<String> = request
        .extensions()
        .get::<ServiceAuthHeader>()
        .and_then(|h| h.0.clone());

    if let Some(header_value) = header_value {
        match crate::service_auth::authenticate(&state.service_auth_config, state.cache.as_ref(), &header_value)
            .await
        {
            Some(service) => {
                if let Some(ctx) = request.extensions_mut().get_mut::<RequestContext>() {
                    ctx.authenticated_service = Some(service);
                }
            }
            None => warn!("service authentication failed, proceeding anonymously"),
        }
    }

    next.run(request).await
}
