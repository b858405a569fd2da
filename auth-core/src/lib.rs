//! Auth Core Library
//!
//! Core cryptographic and tokenization primitives for the auth service.
//! This crate provides:
//! - Ethereum-style signature verification (secp256k1 + Keccak256, EIP-191)
//! - Service-to-service signing (P-256 ECDSA over SHA-256)
//! - PASETO v2.local token minting and verification
//! - Common error handling

pub mod crypto;
pub mod error;
pub mod token;

pub use error::{CoreError, Result};
pub use token::{Payload, Role, TokenMaker, TokenType};
