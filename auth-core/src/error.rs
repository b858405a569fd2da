//! Error types for auth-core
//!
//! Provides a unified error type for crypto primitives and token operations.

use thiserror::Error;

/// Result type alias for auth-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Unified error type for auth-core
#[derive(Error, Debug)]
pub enum CoreError {
    // ===== Signature Errors =====
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("invalid signature encoding: {0}")]
    SignatureEncoding(String),

    #[error("invalid signature length: expected {expected}, got {actual}")]
    SignatureLength { expected: usize, actual: usize },

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    // ===== Key Errors =====
    #[error("invalid PEM input: {0}")]
    InvalidPem(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ===== Address Errors =====
    #[error("invalid ethereum address: {0}")]
    InvalidAddress(String),

    // ===== Token Errors =====
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    // ===== Generic Errors =====
    #[error("internal error: {0}")]
    Internal(String),
}
