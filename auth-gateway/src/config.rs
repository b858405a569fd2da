//! Gateway configuration (ambient stack).
//!
//! A `clap`-derived CLI with `env` fallbacks for the fixed keys in the
//! external-interfaces table, plus a scan of the process environment for
//! the dynamically-named `SERVICE_{NAME}_PUBLIC_KEYS` / `_PRIVATE_KEYS`
//! pairs clap can't express as static fields.

use crate::service_auth::ServiceAuthConfig;
use clap::Parser;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "auth-gateway")]
#[command(about = "SIWE and service-to-service authentication core")]
pub struct GatewayConfig {
    /// development | staging | production — governs SIWE's http-scheme relaxation.
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,

    /// This service's own name, used as the cache-key prefix.
    #[arg(long, env = "SERVICE", default_value = "auth")]
    pub service: String,

    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_value = "http://localhost:3000")]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "DB_SOURCE")]
    pub db_source: String,

    #[arg(long, env = "DB_MIGRATION_URL")]
    pub db_migration_url: Option<String>,

    #[arg(long, env = "REDIS_CONN_URL")]
    pub redis_conn_url: String,

    #[arg(long, env = "HTTP_SERVER_ADDRESS", default_value = "0.0.0.0:8080")]
    pub http_server_address: String,

    #[arg(long, env = "GRPC_SERVER_ADDRESS", default_value = "0.0.0.0:9090")]
    pub grpc_server_address: String,

    /// Base64 or raw 32-byte PASETO symmetric key.
    #[arg(long, env = "TOKEN_SYMMETRIC_KEY")]
    pub token_symmetric_key: String,

    #[arg(long, env = "ACCESS_TOKEN_DURATION", default_value = "15m")]
    pub access_token_duration: String,

    #[arg(long, env = "REFRESH_TOKEN_DURATION", default_value = "168h")]
    pub refresh_token_duration: String,
}

impl GatewayConfig {
    pub fn access_token_duration(&self) -> chrono::Duration {
        duration_from_go_string(&self.access_token_duration)
            .expect("ACCESS_TOKEN_DURATION must look like '15m' or '900s'")
    }

    pub fn refresh_token_duration(&self) -> chrono::Duration {
        duration_from_go_string(&self.refresh_token_duration)
            .expect("REFRESH_TOKEN_DURATION must look like '168h'")
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Raw key bytes for the PASETO symmetric token maker. Accepts either a
    /// raw 32-byte string or a base64-encoded 32-byte key.
    pub fn token_symmetric_key_bytes(&self) -> Vec<u8> {
        use base64::Engine;
        if self.token_symmetric_key.len() == auth_core::token::SYMMETRIC_KEY_LENGTH {
            return self.token_symmetric_key.as_bytes().to_vec();
        }
        base64::engine::general_purpose::STANDARD
            .decode(&self.token_symmetric_key)
            .unwrap_or_else(|_| self.token_symmetric_key.as_bytes().to_vec())
    }
}

/// Parse a Go-style duration string (`"15m"`, `"168h"`, `"900s"`). Only the
/// single-unit subset this service's config ever uses is supported — not
/// the full `time.ParseDuration` grammar.
fn duration_from_go_string(s: &str) -> Option<chrono::Duration> {
    let s = s.trim();
    let (digits, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit())?);
    let n: i64 = digits.parse().ok()?;
    match unit {
        "s" => Some(chrono::Duration::seconds(n)),
        "m" => Some(chrono::Duration::minutes(n)),
        "h" => Some(chrono::Duration::hours(n)),
        _ => None,
    }
}

/// Scan the process environment for `SERVICE_{NAME}_PUBLIC_KEYS` and
/// `SERVICE_{NAME}_PRIVATE_KEYS`, each a comma-separated list of PEM blocks
/// (newlines inside a single PEM entry are encoded as `\n`). Builds the
/// lowercase-service-name-keyed maps [`ServiceAuthConfig`] expects.
pub fn load_service_auth_config() -> ServiceAuthConfig {
    let mut public_keys: HashMap<String, Vec<String>> = HashMap::new();
    let mut private_keys: HashMap<String, Vec<String>> = HashMap::new();

    for (key, value) in std::env::vars() {
        if let Some(name) = key
            .strip_prefix("SERVICE_")
            .and_then(|rest| rest.strip_suffix("_PUBLIC_KEYS"))
        {
            public_keys.insert(name.to_lowercase(), split_pem_list(&value));
        } else if let Some(name) = key
            .strip_prefix("SERVICE_")
            .and_then(|rest| rest.strip_suffix("_PRIVATE_KEYS"))
        {
            private_keys.insert(name.to_lowercase(), split_pem_list(&value));
        }
    }

    ServiceAuthConfig::new(public_keys, private_keys)
}

fn split_pem_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.replace("\\n", "\n").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Read/write deadline applied to the HTTP server (original `server.go`).
pub const HTTP_READ_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle-connection timeout applied to the HTTP server.
pub const HTTP_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
