//! PASETO v2.local token maker
//!
//! Issues and verifies symmetric authenticated tokens carrying a typed
//! [`Payload`]. The token itself carries no server-side state; all fields
//! needed to authorize a request travel inside the encrypted payload.

use crate::error::{CoreError, Result};
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::version2::V2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Required length of the PASETO symmetric key, in bytes.
pub const SYMMETRIC_KEY_LENGTH: usize = 32;

/// A credential's role. `Admin` bypasses user-id ownership checks in the
/// authorization middleware; nothing in this crate issues admin tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::TokenInvalid(format!("unknown role: {other}"))),
        }
    }
}

/// Distinguishes access tokens (short-lived, used for API calls) from
/// refresh tokens (longer-lived, used only to mint a new access token).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// The decrypted contents of a token. `id` is the token's own identity —
/// for a refresh token, this value also becomes the session id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub role: Role,
    pub token_type: TokenType,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl Payload {
    fn new(
        user_id: Uuid,
        wallet_address: String,
        role: Role,
        token_type: TokenType,
        duration: chrono::Duration,
    ) -> Self {
        let issued_at = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            wallet_address,
            role,
            token_type,
            issued_at,
            expires_at: issued_at + duration,
        }
    }

    /// `Ok(())` iff the payload has not yet expired.
    pub fn valid(&self) -> Result<()> {
        if chrono::Utc::now() > self.expires_at {
            return Err(CoreError::TokenExpired);
        }
        Ok(())
    }
}

/// Mints and verifies PASETO v2.local tokens carrying a [`Payload`].
pub struct TokenMaker {
    key: SymmetricKey<V2>,
}

impl TokenMaker {
    /// Build a maker from a raw symmetric key. Fails if the key is not
    /// exactly [`SYMMETRIC_KEY_LENGTH`] bytes — PASETO v2.local uses
    /// XChaCha20-Poly1305 under the hood, which requires a 32-byte key.
    pub fn new(symmetric_key: &[u8]) -> Result<Self> {
        if symmetric_key.len() != SYMMETRIC_KEY_LENGTH {
            return Err(CoreError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_LENGTH,
                actual: symmetric_key.len(),
            });
        }
        let key = SymmetricKey::<V2>::from(symmetric_key)
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Issue a new token, returning the encoded token string and the
    /// payload that was encrypted into it.
    pub fn create_token(
        &self,
        user_id: Uuid,
        wallet_address: &str,
        role: Role,
        token_type: TokenType,
        duration: chrono::Duration,
    ) -> Result<(String, Payload)> {
        let payload = Payload::new(user_id, wallet_address.to_string(), role, token_type, duration);

        let mut claims = Claims::new().map_err(|e| CoreError::Internal(e.to_string()))?;
        claims
            .add_additional("payload", serde_json::to_value(&payload).map_err(|e| {
                CoreError::Internal(e.to_string())
            })?)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        // `Claims::new()` stamps a default one-hour `exp`; override it with
        // the token's real TTL so pasetors' own expiry check (enforced by
        // `ClaimsValidationRules::new()` in `verify_token`) doesn't reject a
        // week-long refresh token an hour after issuance.
        claims
            .expiration(&payload.expires_at.to_rfc3339())
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let token = pasetors::local::encrypt(&self.key, &claims, None, None)
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        Ok((token, payload))
    }

    /// Decrypt and validate a token, returning its payload. Fails with
    /// [`CoreError::TokenExpired`] if the payload's `expires_at` has
    /// passed, or [`CoreError::TokenInvalid`] on any cryptographic or
    /// structural failure.
    pub fn verify_token(&self, token: &str) -> Result<Payload> {
        let untrusted = UntrustedToken::try_from(token)
            .map_err(|e| CoreError::TokenInvalid(e.to_string()))?;
        let rules = ClaimsValidationRules::new();
        let trusted = pasetors::local::decrypt(&self.key, &untrusted, &rules, None, None)
            .map_err(|e| CoreError::TokenInvalid(e.to_string()))?;

        let json: serde_json::Value = serde_json::from_str(trusted.payload())
            .map_err(|e| CoreError::TokenInvalid(e.to_string()))?;
        let payload_value = json
            .get("payload")
            .ok_or_else(|| CoreError::TokenInvalid("missing payload claim".into()))?;
        let payload: Payload = serde_json::from_value(payload_value.clone())
            .map_err(|e| CoreError::TokenInvalid(e.to_string()))?;

        payload.valid()?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maker() -> TokenMaker {
        TokenMaker::new(&[3u8; SYMMETRIC_KEY_LENGTH]).unwrap()
    }

    #[test]
    fn test_short_key_rejected() {
        let err = TokenMaker::new(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKeyLength { .. }));
    }

    #[test]
    fn test_create_and_verify_roundtrip() {
        let maker = maker();
        let user_id = Uuid::new_v4();
        let (token, payload) = maker
            .create_token(
                user_id,
                "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
                Role::User,
                TokenType::Access,
                chrono::Duration::minutes(15),
            )
            .unwrap();

        let verified = maker.verify_token(&token).unwrap();
        assert_eq!(verified.id, payload.id);
        assert_eq!(verified.user_id, user_id);
        assert_eq!(verified.wallet_address, "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        assert_eq!(verified.role, Role::User);
        assert_eq!(verified.token_type, TokenType::Access);

        let slack = (verified.expires_at - (verified.issued_at + chrono::Duration::minutes(15)))
            .num_seconds()
            .abs();
        assert!(slack <= 1);
    }

    #[test]
    fn test_expired_token_rejected() {
        let maker = maker();
        let (token, _) = maker
            .create_token(
                Uuid::new_v4(),
                "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
                Role::User,
                TokenType::Access,
                chrono::Duration::seconds(-1),
            )
            .unwrap();

        let err = maker.verify_token(&token).unwrap_err();
        assert!(matches!(err, CoreError::TokenExpired));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let maker = maker();
        let (mut token, _) = maker
            .create_token(
                Uuid::new_v4(),
                "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
                Role::User,
                TokenType::Access,
                chrono::Duration::minutes(15),
            )
            .unwrap();
        token.push('x');

        assert!(maker.verify_token(&token).is_err());
    }

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("superuser".parse::<Role>().is_err());
    }

    proptest::proptest! {
        /// For any inputs, `create_token` followed by `verify_token` returns
        /// a payload whose identity fields round-trip exactly and whose
        /// `expires_at` lands within a second of `now + duration`.
        #[test]
        fn prop_create_then_verify_roundtrips(
            wallet_address in "0x[0-9a-fA-F]{40}",
            is_admin in proptest::bool::ANY,
            is_refresh in proptest::bool::ANY,
            duration_minutes in 1i64..=10_000i64,
        ) {
            let maker = maker();
            let user_id = Uuid::new_v4();
            let role = if is_admin { Role::Admin } else { Role::User };
            let token_type = if is_refresh { TokenType::Refresh } else { TokenType::Access };
            let duration = chrono::Duration::minutes(duration_minutes);

            let (token, payload) = maker
                .create_token(user_id, &wallet_address, role, token_type, duration)
                .unwrap();
            let verified = maker.verify_token(&token).unwrap();

            proptest::prop_assert_eq!(verified.id, payload.id);
            proptest::prop_assert_eq!(verified.user_id, user_id);
            proptest::prop_assert_eq!(verified.wallet_address, wallet_address);
            proptest::prop_assert_eq!(verified.role, role);
            proptest::prop_assert_eq!(verified.token_type, token_type);

            let slack = (verified.expires_at - (verified.issued_at + duration)).num_seconds().abs();
            proptest::prop_assert!(slack <= 1);
        }
    }
}
