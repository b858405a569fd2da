//! auth-gateway binary entry point.
//!
//! Builds [`AppState`] from [`GatewayConfig`], then serves the same
//! [`handler::Handler`] business logic over both an axum HTTP router and a
//! tonic gRPC server, shutting both down together on SIGINT/SIGTERM.

use anyhow::Context;
use auth_gateway::config::{self, GatewayConfig, HTTP_IDLE_TIMEOUT, HTTP_READ_WRITE_TIMEOUT};
use auth_gateway::{endpoints, grpc_api, http_api, metrics, middleware, AppState};
use auth_protocol::auth::auth_service_server::AuthServiceServer;
use auth_store::{Rate, RateLimitRegistry};
use axum::http::HeaderValue;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

fn rate_limit_overrides() -> Vec<(String, Rate)> {
    vec![(
        endpoints::GET_SIWE_PAYLOAD_RPC.to_string(),
        Rate::new(100, Duration::from_secs(3600), "siwe-payload")
            .with_aliases([endpoints::GET_SIWE_PAYLOAD_HTTP]),
    )]
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

fn http_router(state: Arc<AppState>, handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    let authenticated = http_api::routes()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::service_authentication,
        ))
        .layer(axum::middleware::from_fn(middleware::structured_logger))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(axum::middleware::from_fn(middleware::extract_metadata));

    Router::new()
        .merge(authenticated)
        .merge(http_api::health_routes())
        .merge(metrics::routes(handle))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = GatewayConfig::parse();
    let service_auth_config = config::load_service_auth_config();
    let rate_limits = RateLimitRegistry::new(config.service.clone(), rate_limit_overrides());

    let state = Arc::new(
        AppState::new(&config, service_auth_config, rate_limits)
            .await
            .context("failed to build application state")?,
    );

    let prometheus_handle = metrics::init_metrics();

    let http_addr: SocketAddr = config
        .http_server_address
        .parse()
        .context("invalid HTTP_SERVER_ADDRESS")?;
    let grpc_addr: SocketAddr = config
        .grpc_server_address
        .parse()
        .context("invalid GRPC_SERVER_ADDRESS")?;

    let router = http_router(state.clone(), prometheus_handle);
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;

    info!(%http_addr, %grpc_addr, "auth-gateway starting");

    let http_server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    let auth_service = AuthServiceServer::new(grpc_api::AuthServiceImpl::new(state.clone()));
    let grpc_server = tonic::transport::Server::builder()
        .timeout(HTTP_READ_WRITE_TIMEOUT)
        .tcp_keepalive(Some(HTTP_IDLE_TIMEOUT))
        .add_service(auth_service)
        .serve_with_shutdown(grpc_addr, shutdown_signal());

    let (http_result, grpc_result) = tokio::join!(http_server, grpc_server);
    http_result.context("HTTP server error")?;
    grpc_result.context("gRPC server error")?;

    state.cache.close().await.ok();
    info!("auth-gateway shut down cleanly");

    Ok(())
}
