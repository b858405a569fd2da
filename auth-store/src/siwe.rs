//! Sign-In-With-Ethereum challenge engine (component E).
//!
//! Generates EIP-4361 messages, caches them under a per-wallet key with a
//! 15-minute TTL, and consumes them atomically on verification so a replayed
//! signature can never be checked against the same challenge twice.

use crate::cache::Cache;
use auth_core::crypto::{ethereum, random};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const CACHE_PREFIX: &str = "siwe-message";
const VERSION: u32 = 1;
const NONCE_LENGTH: usize = 8;
const EXPIRATION: Duration = Duration::from_secs(15 * 60);

const TEMPLATE: &str = "{domain} wants you to sign in with your Ethereum account:\n\
{wallet}\n\
\n\
I accept the {domain} Terms of Service\n\
\n\
URI: {uri}\n\
Version: {version}\n\
Chain ID: {chain_id}\n\
Nonce: {nonce}\n\
Issued At: {issued_at}\n\
Expiration Time: {expires_at}";

#[derive(Error, Debug)]
pub enum SiweError {
    #[error("invalid wallet address: {0}")]
    InvalidWalletAddress(String),

    #[error("domain {0} is not allowed")]
    DomainNotAllowed(String),

    #[error("chain {0} is not supported for this environment")]
    UnsupportedChain(i64),

    #[error("could not parse uri: {0}")]
    InvalidUri(String),

    #[error("uri hostname does not match domain")]
    HostnameMismatch,

    #[error("unsupported uri scheme: {0}")]
    UnsupportedScheme(String),

    #[error("no SIWE challenge found for this wallet")]
    MessageNotFound,

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),
}

pub type Result<T> = std::result::Result<T, SiweError>;

/// A chain registry entry: chains are matched by `chain_id` *and*
/// environment membership, mirroring the original's two-key lookup.
#[derive(Debug, Clone)]
pub struct Chain {
    pub name: String,
    pub chain_id: i64,
    pub environments: Vec<String>,
}

/// Compiled-in default registry: Saigon testnet, usable in development and
/// staging. Overridable by constructing [`SiweConfig`] directly.
pub fn default_chains() -> Vec<Chain> {
    vec![Chain {
        name: "Saigon".to_string(),
        chain_id: 2021,
        environments: vec!["development".to_string(), "staging".to_string()],
    }]
}

#[derive(Debug, Clone)]
pub struct SiweConfig {
    pub service_name: String,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub chains: Vec<Chain>,
}

impl SiweConfig {
    fn chain(&self, chain_id: i64) -> Option<&Chain> {
        self.chains
            .iter()
            .find(|c| c.chain_id == chain_id && c.environments.iter().any(|e| e == &self.environment))
    }

    fn domain_allowed(&self, domain: &str) -> bool {
        self.allowed_origins.iter().any(|origin| {
            Url::parse(origin)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
                .as_deref()
                == Some(domain)
        })
    }

    fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

/// A freshly generated SIWE challenge.
#[derive(Debug, Clone)]
pub struct SiwePayload {
    pub nonce: String,
    pub message: String,
    pub wallet_address: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn cache_key(config: &SiweConfig, wallet_address: &str) -> String {
    format!("{}-{}:{}", config.service_name, CACHE_PREFIX, wallet_address)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Validate inputs, build the EIP-4361 message, cache it, and return the
/// challenge payload.
pub async fn generate_siwe_payload(
    config: &SiweConfig,
    cache: &dyn Cache,
    domain: &str,
    uri: &str,
    chain_id: i64,
    wallet_address: &str,
) -> Result<SiwePayload> {
    let wallet_address = auth_core::crypto::normalize_hex_string(wallet_address);
    if !ethereum::is_hex_address(&wallet_address) {
        return Err(SiweError::InvalidWalletAddress(wallet_address));
    }

    if !config.domain_allowed(domain) {
        return Err(SiweError::DomainNotAllowed(domain.to_string()));
    }

    if config.chain(chain_id).is_none() {
        return Err(SiweError::UnsupportedChain(chain_id));
    }

    let parsed = Url::parse(uri).map_err(|e| SiweError::InvalidUri(e.to_string()))?;
    let host = parsed
        .host_str()
        .map(|h| h.trim_start_matches("www."))
        .unwrap_or("");
    if host != domain {
        return Err(SiweError::HostnameMismatch);
    }

    let scheme_ok = parsed.scheme() == "https" || (config.is_development() && parsed.scheme() == "http");
    if !scheme_ok {
        return Err(SiweError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    let mut stripped = parsed;
    stripped.set_query(None);
    stripped.set_fragment(None);

    let nonce = random::numeric(NONCE_LENGTH);
    let issued_at = Utc::now();
    let expires_at = issued_at + ChronoDuration::from_std(EXPIRATION).unwrap();

    let message = TEMPLATE
        .replace("{domain}", domain)
        .replace("{wallet}", &wallet_address)
        .replace("{uri}", stripped.as_str())
        .replace("{version}", &VERSION.to_string())
        .replace("{chain_id}", &chain_id.to_string())
        .replace("{nonce}", &nonce)
        .replace("{issued_at}", &format_timestamp(issued_at))
        .replace("{expires_at}", &format_timestamp(expires_at));

    cache
        .set(&cache_key(config, &wallet_address), &message, EXPIRATION)
        .await?;

    Ok(SiwePayload {
        nonce,
        message,
        wallet_address,
        issued_at,
        expires_at,
    })
}

/// Consume the cached challenge for `wallet_address`: a single successful
/// fetch is the only one that will ever see this message, including under
/// concurrent callers racing the same challenge.
pub async fn fetch_siwe_message(
    config: &SiweConfig,
    cache: &dyn Cache,
    wallet_address: &str,
) -> Result<String> {
    let wallet_address = auth_core::crypto::normalize_hex_string(wallet_address);
    let key = cache_key(config, &wallet_address);
    cache.get_del(&key).await?.ok_or(SiweError::MessageNotFound)
}
