//! Rate-limit registry (component D).
//!
//! A process-wide mapping of endpoint key to [`Rate`] policy, initialized
//! once at startup. Endpoint keys are the full gRPC method string
//! (`/auth.v1.AuthService/Authenticate`) or `METHOD:/path` for HTTP routes.
//! Aliases let several endpoint keys share one underlying distributed
//! counter by giving them the same `identifier`.

use crate::cache::Cache;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Identifier shared by the default policy; used as the Redis key prefix
/// when no per-endpoint override applies.
pub const DEFAULT_RATE_LIMIT_IDENTIFIER: &str = "default_rate_limit";

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("client ip missing from request metadata")]
    MissingClientIp,
}

pub type Result<T> = std::result::Result<T, RateLimitError>;

/// A single rate policy: `limit` requests per `period`, counted under
/// `identifier`. `aliases` are additional endpoint keys that resolve to this
/// same policy (and therefore the same counter, since the counter key is
/// derived from `identifier`, not the endpoint key).
#[derive(Debug, Clone)]
pub struct Rate {
    pub limit: u64,
    pub period: Duration,
    pub identifier: String,
    pub aliases: Vec<String>,
}

impl Rate {
    pub fn new(limit: u64, period: Duration, identifier: impl Into<String>) -> Self {
        Self {
            limit,
            period,
            identifier: identifier.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// Default policy applied when no per-endpoint override matches: 1000
/// requests per hour.
pub fn default_rate_limit() -> Rate {
    Rate::new(1000, Duration::from_secs(3600), DEFAULT_RATE_LIMIT_IDENTIFIER)
}

/// Outcome of a rate check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub limit: u64,
    pub remaining: u64,
    pub reset_seconds: u64,
    pub reached: bool,
}

/// Endpoint-keyed policy table plus the logic to check and increment the
/// distributed counter backing each policy.
#[derive(Debug, Clone)]
pub struct RateLimitRegistry {
    service: String,
    policies: HashMap<String, Rate>,
    default: Rate,
}

impl RateLimitRegistry {
    /// Build a registry from a set of per-endpoint overrides. Every endpoint
    /// not named here (and not an alias of a named one) falls back to
    /// [`default_rate_limit`]. `service` namespaces the distributed counter
    /// keys so multiple services can share one cache without colliding.
    pub fn new(service: impl Into<String>, overrides: impl IntoIterator<Item = (String, Rate)>) -> Self {
        let mut policies = HashMap::new();
        for (key, rate) in overrides {
            for alias in &rate.aliases {
                policies.insert(alias.clone(), rate.clone());
            }
            policies.insert(key, rate);
        }
        Self {
            service: service.into(),
            policies,
            default: default_rate_limit(),
        }
    }

    /// Exact-match lookup by endpoint key, falling back to the default
    /// policy on a miss.
    pub fn lookup(&self, endpoint: &str) -> &Rate {
        self.policies.get(endpoint).unwrap_or(&self.default)
    }

    /// Increment the counter for `(policy.identifier, client_ip)` and
    /// report the resulting limit/remaining/reset/reached state.
    pub async fn check(
        &self,
        cache: &dyn Cache,
        policy: &Rate,
        client_ip: Option<&str>,
    ) -> Result<RateLimitResult> {
        let client_ip = client_ip.ok_or(RateLimitError::MissingClientIp)?;
        let key = format!("{}-api-rate-limiter:{}:{}", self.service, policy.identifier, client_ip);
        let count = cache.incr(&key, policy.period).await?;
        let remaining = policy.limit.saturating_sub(count);
        Ok(RateLimitResult {
            limit: policy.limit,
            remaining,
            reset_seconds: policy.period.as_secs(),
            reached: count > policy.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    #[test]
    fn unconfigured_endpoint_falls_back_to_default() {
        let registry = RateLimitRegistry::new("auth", []);
        let rate = registry.lookup("/auth.v1.AuthService/Authenticate");
        assert_eq!(rate.identifier, DEFAULT_RATE_LIMIT_IDENTIFIER);
        assert_eq!(rate.limit, 1000);
    }

    #[test]
    fn alias_shares_identifier_with_primary() {
        let rate = Rate::new(10, Duration::from_secs(60), "siwe")
            .with_aliases(["GET:/auth/siwe-payload"]);
        let registry = RateLimitRegistry::new("auth", [(
            "/auth.v1.AuthService/GetSIWEPayload".to_string(),
            rate,
        )]);
        let primary = registry.lookup("/auth.v1.AuthService/GetSIWEPayload");
        let alias = registry.lookup("GET:/auth/siwe-payload");
        assert_eq!(primary.identifier, alias.identifier);
    }

    #[tokio::test]
    async fn limit_plus_one_request_is_reached() {
        let cache = InMemoryCache::new();
        let rate = Rate::new(2, Duration::from_secs(60), "test-policy");
        let registry = RateLimitRegistry::new("auth", [("x".to_string(), rate)]);
        let policy = registry.lookup("x");

        let first = registry.check(&cache, policy, Some("1.2.3.4")).await.unwrap();
        assert!(!first.reached);
        let second = registry.check(&cache, policy, Some("1.2.3.4")).await.unwrap();
        assert!(!second.reached);
        let third = registry.check(&cache, policy, Some("1.2.3.4")).await.unwrap();
        assert!(third.reached);
    }

    #[tokio::test]
    async fn missing_client_ip_is_rejected() {
        let cache = InMemoryCache::new();
        let registry = RateLimitRegistry::new("auth", []);
        let policy = registry.lookup("anything");
        let err = registry.check(&cache, policy, None).await.unwrap_err();
        assert!(matches!(err, RateLimitError::MissingClientIp));
    }

    proptest::proptest! {
        /// For any identifier with limit L, the first L requests from the
        /// same client IP in one period all succeed and remaining strictly
        /// decreases; the (L+1)th is reached and remaining never underflows.
        #[test]
        fn prop_limit_plus_one_request_is_reached(limit in 1u64..=50u64) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let cache = InMemoryCache::new();
                let rate = Rate::new(limit, Duration::from_secs(60), "prop-policy");
                let registry = RateLimitRegistry::new("auth", [("x".to_string(), rate)]);
                let policy = registry.lookup("x");

                let mut previous_remaining = limit;
                for _ in 0..limit {
                    let result = registry.check(&cache, policy, Some("9.9.9.9")).await.unwrap();
                    proptest::prop_assert!(!result.reached);
                    proptest::prop_assert!(result.remaining <= previous_remaining);
                    previous_remaining = result.remaining;
                }

                let over = registry.check(&cache, policy, Some("9.9.9.9")).await.unwrap();
                proptest::prop_assert!(over.reached);
                Ok(())
            })?;
        }
    }
}
