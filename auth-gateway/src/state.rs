//! Shared application state.
//!
//! Everything both transports (axum and tonic) need: the cache handle, the
//! Postgres-backed store, the token maker, and the registries built once at
//! startup from [`crate::config::GatewayConfig`].

use crate::config::GatewayConfig;
use crate::handler::Handler;
use crate::service_auth::ServiceAuthConfig;
use auth_store::{Cache, Database, DbConfig, RateLimitRegistry, RedisCache, RedisCacheConfig, SiweConfig, Store};
use std::sync::Arc;

pub struct AppState {
    pub handler: Handler,
    pub service_auth_config: ServiceAuthConfig,
    pub rate_limits: RateLimitRegistry,
    pub cache: Arc<dyn Cache>,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub async fn new(
        config: &GatewayConfig,
        service_auth_config: ServiceAuthConfig,
        rate_limits: RateLimitRegistry,
    ) -> anyhow::Result<Self> {
        let cache: Arc<dyn Cache> = Arc::new(
            RedisCache::connect(&RedisCacheConfig {
                url: config.redis_conn_url.clone(),
            })
            .await?,
        );

        let database = Database::connect(&DbConfig {
            url: config.db_source.clone(),
            ..DbConfig::default()
        })
        .await?;
        database.migrate().await?;
        let store: Arc<dyn Store> = Arc::new(database);

        let token_maker = auth_core::TokenMaker::new(&config.token_symmetric_key_bytes())?;

        let siwe_config = SiweConfig {
            service_name: config.service.clone(),
            environment: config.environment.clone(),
            allowed_origins: config.allowed_origins.clone(),
            chains: auth_store::siwe::default_chains(),
        };

        let handler = Handler {
            siwe_config,
            cache: cache.clone(),
            store,
            token_maker,
            access_token_duration: config.access_token_duration(),
            refresh_token_duration: config.refresh_token_duration(),
        };

        Ok(Self {
            handler,
            service_auth_config,
            rate_limits,
            cache,
            allowed_origins: config.allowed_origins.clone(),
        })
    }
}
