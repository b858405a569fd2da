//! Service-to-service authentication (component F).
//!
//! Verifies the `x-service-authentication` header, a dotted
//! `service.ts_millis.nonce.sig_b64` payload, against a per-service list of
//! configured public keys, and rejects replays via a short-window cache.
//! On every failure path the request proceeds **without** an authenticated
//! service identity — errors here are never surfaced to the caller; that is
//! the job of the authorization layer downstream.

use auth_core::crypto::service_auth;
use auth_store::Cache;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const NONCE_LENGTH: usize = 10;
const PAYLOAD_DURATION: Duration = Duration::from_secs(60);
const CACHE_PREFIX: &str = "service-authentication";

/// PEM-encoded public/private keys for every peer service this core knows
/// about, loaded once at startup from `SERVICE_{NAME}_PUBLIC_KEYS` /
/// `SERVICE_{NAME}_PRIVATE_KEYS`.
#[derive(Debug, Clone, Default)]
pub struct ServiceAuthConfig {
    public_keys: HashMap<String, Vec<String>>,
    private_keys: HashMap<String, Vec<String>>,
}

impl ServiceAuthConfig {
    pub fn new(
        public_keys: HashMap<String, Vec<String>>,
        private_keys: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            public_keys,
            private_keys,
        }
    }

    fn public_keys_for(&self, service: &str) -> Option<&[String]> {
        self.public_keys.get(service).map(Vec::as_slice)
    }

    fn private_keys_for(&self, service: &str) -> Option<&[String]> {
        self.private_keys.get(service).map(Vec::as_slice)
    }
}

/// Parse, validate and verify an `x-service-authentication` header value.
/// Returns the lowercase, trimmed service name on success; `None` on any
/// failure (malformed payload, unknown service, bad signature, replay).
pub async fn authenticate(
    config: &ServiceAuthConfig,
    cache: &dyn Cache,
    header_value: &str,
) -> Option<String> {
    let parts: Vec<&str> = header_value.split('.').collect();
    if parts.len() != 4 {
        warn!("invalid service authentication payload");
        return None;
    }
    let (service, ts_str, nonce, signature) = (parts[0], parts[1], parts[2], parts[3]);

    if service.trim().is_empty() {
        warn!("service name must be provided");
        return None;
    }

    let ts_millis: i64 = match ts_str.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!("invalid service authentication request timestamp");
            return None;
        }
    };
    let req_time = chrono::DateTime::<Utc>::from_timestamp_millis(ts_millis)?;
    let skew = (Utc::now() - req_time).abs();
    if skew > chrono::Duration::from_std(PAYLOAD_DURATION).unwrap() {
        warn!(service = %service, "service authentication payload timestamp out of window");
        return None;
    }

    if nonce.len() != NONCE_LENGTH {
        warn!(service = %service, "invalid service authentication nonce");
        return None;
    }

    let public_keys = match config.public_keys_for(service) {
        Some(keys) if !keys.is_empty() => keys,
        _ => {
            warn!(service = %service, "service authentication public keys not found");
            return None;
        }
    };

    let message = format!("{service}.{ts_str}.{nonce}");

    // OR-reduce with short-circuit on first success. The original Go source
    // overwrites its result variable inside this loop with no break, so the
    // outcome is whatever the *last* key says; that defect is not
    // reproduced here.
    let mut verified = false;
    for pem in public_keys {
        let public_key = match service_auth::parse_public_key_pem(pem) {
            Ok(k) => k,
            Err(_) => {
                warn!(service = %service, "could not parse public key from PEM");
                return None;
            }
        };
        match service_auth::verify(message.as_bytes(), &public_key, signature) {
            Ok(true) => {
                verified = true;
                break;
            }
            Ok(false) => continue,
            Err(_) => {
                warn!(service = %service, "could not verify service authentication signature");
                return None;
            }
        }
    }

    if !verified {
        warn!(service = %service, "invalid service authentication signature");
        return None;
    }

    let cache_key = format!("{service}-{CACHE_PREFIX}:{signature}");
    match cache.get(&cache_key).await {
        Ok(Some(_)) => {
            warn!(service = %service, "service authentication signature already present in cache");
            return None;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(service = %service, error = %e, "could not fetch service authentication cache");
            return None;
        }
    }

    if let Err(e) = cache.set(&cache_key, signature, PAYLOAD_DURATION).await {
        warn!(service = %service, error = %e, "could not cache service authentication signature");
        return None;
    }

    Some(service.to_lowercase().trim().to_string())
}

/// Build the payload a caller service sends as its own
/// `x-service-authentication` header. Signs with the *last* configured
/// private key, supporting rolling rotation: publish the new public key
/// everywhere first, then move the private key.
pub fn generate_payload(config: &ServiceAuthConfig, caller_service: &str) -> Option<String> {
    let caller_service = caller_service.to_lowercase().trim().to_string();
    let private_keys = config.private_keys_for(&caller_service)?;
    let pem = private_keys.last()?;
    let private_key = service_auth::parse_private_key_pem(pem).ok()?;

    let nonce = auth_core::crypto::random::alphanumeric(NONCE_LENGTH);
    let ts_millis = Utc::now().timestamp_millis();
    let message = format!("{caller_service}.{ts_millis}.{nonce}");
    let signature = service_auth::sign(message.as_bytes(), &private_key).ok()?;

    Some(format!("{message}.{signature}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_store::InMemoryCache;
    use p256::ecdsa::SigningKey;
    use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rand::rngs::OsRng;

    fn config_for(service: &str) -> ServiceAuthConfig {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let private_pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string();
        let public_pem = verifying_key.to_public_key_pem(LineEnding::LF).unwrap();

        ServiceAuthConfig::new(
            HashMap::from([(service.to_string(), vec![public_pem])]),
            HashMap::from([(service.to_string(), vec![private_pem])]),
        )
    }

    #[tokio::test]
    async fn valid_payload_authenticates_once_then_replays_are_anonymous() {
        let config = config_for("users");
        let cache = InMemoryCache::new();

        let payload = generate_payload(&config, "users").unwrap();
        let service = authenticate(&config, &cache, &payload).await;
        assert_eq!(service.as_deref(), Some("users"));

        let replay = authenticate(&config, &cache, &payload).await;
        assert_eq!(replay, None);
    }

    #[tokio::test]
    async fn malformed_header_is_anonymous() {
        let config = config_for("users");
        let cache = InMemoryCache::new();
        assert_eq!(authenticate(&config, &cache, "not.enough.parts").await, None);
    }

    #[tokio::test]
    async fn unknown_service_is_anonymous() {
        let config = config_for("users");
        let cache = InMemoryCache::new();
        let payload = generate_payload(&config, "users").unwrap();
        let forged = payload.replacen("users", "evil", 1);
        assert_eq!(authenticate(&config, &cache, &forged).await, None);
    }
}
