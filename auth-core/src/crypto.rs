//! Cryptographic primitives for the auth service
//!
//! Provides:
//! - Ethereum-style message signing/recovery (secp256k1 + Keccak256, EIP-191)
//! - Service-to-service signing (P-256 ECDSA over SHA-256, ASN.1 DER, base64)
//! - PEM parsing with automatic header synthesis
//! - Cryptographically secure random string generation

use crate::error::{CoreError, Result};
use base64::Engine;

/// Ethereum-style signature verification and address recovery.
pub mod ethereum {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    /// Raw secp256k1 signature length: 32 bytes r + 32 bytes s + 1 byte v.
    pub const SIGNATURE_LENGTH: usize = 65;

    fn keccak256(data: &[u8]) -> [u8; 32] {
        use tiny_keccak::{Hasher, Keccak};
        let mut hasher = Keccak::v256();
        let mut output = [0u8; 32];
        hasher.update(data);
        hasher.finalize(&mut output);
        output
    }

    /// Hash a message the way `personal_sign` does: prefix with
    /// `"\x19Ethereum Signed Message:\n" + len(message)` before hashing.
    pub fn eip191_digest(message: &str) -> [u8; 32] {
        let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
        keccak256(prefixed.as_bytes())
    }

    /// Derive a lowercase `0x`-prefixed address from an uncompressed public key.
    fn address_from_verifying_key(key: &VerifyingKey) -> String {
        let encoded = key.to_encoded_point(false);
        let uncompressed = &encoded.as_bytes()[1..]; // drop the 0x04 prefix
        let hash = keccak256(uncompressed);
        format!("0x{}", hex::encode(&hash[12..]))
    }

    /// Normalize a recovery-id byte. Accepts 0/1 (raw) or 27/28 (Ethereum's
    /// legacy offset) and returns the raw 0/1 form `k256` expects.
    fn normalize_recovery_byte(v: u8) -> Result<u8> {
        match v {
            0 | 27 => Ok(0),
            1 | 28 => Ok(1),
            other => Err(CoreError::InvalidRecoveryId(other)),
        }
    }

    /// Verify a 65-byte `r‖s‖v` signature against a claimed wallet address,
    /// recovering the signer's public key and comparing addresses
    /// case-insensitively. Returns the recovered address on success.
    pub fn verify_signature(wallet_address: &str, message: &str, signature: &[u8]) -> Result<bool> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(CoreError::SignatureLength {
                expected: SIGNATURE_LENGTH,
                actual: signature.len(),
            });
        }

        let (rs, v_byte) = signature.split_at(64);
        let v = normalize_recovery_byte(v_byte[0])?;

        let sig = Signature::from_slice(rs)
            .map_err(|e| CoreError::SignatureEncoding(e.to_string()))?;
        let recovery_id = RecoveryId::new(v != 0, false);

        let digest = eip191_digest(message);
        let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
            .map_err(|e| CoreError::SignatureInvalid(e.to_string()))?;

        let recovered_address = address_from_verifying_key(&recovered);
        Ok(recovered_address.eq_ignore_ascii_case(wallet_address))
    }

    /// Sign a message with a raw 32-byte secp256k1 private key, returning a
    /// `0x`-prefixed 65-byte `r‖s‖v` signature (v normalized to 27/28).
    pub fn sign_message(private_key: &[u8; 32], message: &str) -> Result<String> {
        use k256::ecdsa::SigningKey;

        let signing_key = SigningKey::from_bytes(private_key.into())
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;

        let digest = eip191_digest(message);
        let (sig, recid): (Signature, RecoveryId) = signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CoreError::SignatureInvalid(e.to_string()))?;

        let mut out = Vec::with_capacity(SIGNATURE_LENGTH);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recid.to_byte() + 27);
        Ok(format!("0x{}", hex::encode(out)))
    }

    /// Is `addr` a syntactically valid `0x`-prefixed, 40-hex-digit Ethereum
    /// address? Does not verify EIP-55 checksum casing.
    pub fn is_hex_address(addr: &str) -> bool {
        let stripped = addr.strip_prefix("0x").unwrap_or(addr);
        stripped.len() == 40 && stripped.chars().all(|c| c.is_ascii_hexdigit())
    }
}

/// P-256 ECDSA signing/verification for service-to-service authentication.
pub mod service_auth {
    use super::*;
    use p256::ecdsa::signature::{Signer, Verifier};
    use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
    use p256::pkcs8::DecodePrivateKey;
    use p256::pkcs8::DecodePublicKey;

    /// Sign `message` with a P-256 private key, SHA-256 digest, ASN.1 DER
    /// encoding, base64-encoded.
    pub fn sign(message: &[u8], private_key: &SigningKey) -> Result<String> {
        let signature: Signature = private_key.sign(message);
        Ok(base64::engine::general_purpose::STANDARD.encode(signature.to_der().as_bytes()))
    }

    /// Verify `message` against a base64-encoded ASN.1 DER P-256 signature.
    pub fn verify(message: &[u8], public_key: &VerifyingKey, signature_b64: &str) -> Result<bool> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(signature_b64)
            .map_err(|e| CoreError::SignatureEncoding(e.to_string()))?;
        let signature = Signature::from_der(&der)
            .map_err(|e| CoreError::SignatureEncoding(e.to_string()))?;
        Ok(public_key.verify(message, &signature).is_ok())
    }

    /// Parse a PEM-encoded PKCS#8 P-256 private key, synthesizing the
    /// `-----BEGIN/END EC PRIVATE KEY-----` or PKCS#8 headers if absent.
    pub fn parse_private_key_pem(input: &str) -> Result<SigningKey> {
        let pem = pem::normalize(input, "PRIVATE KEY")?;
        SigningKey::from_pkcs8_pem(&pem).map_err(|e| CoreError::InvalidKey(e.to_string()))
    }

    /// Parse a PEM-encoded SubjectPublicKeyInfo P-256 public key,
    /// synthesizing the `-----BEGIN/END PUBLIC KEY-----` headers if absent.
    pub fn parse_public_key_pem(input: &str) -> Result<VerifyingKey> {
        let normalized = pem::normalize(input, "PUBLIC KEY")?;
        VerifyingKey::from_public_key_pem(&normalized).map_err(|e| CoreError::InvalidKey(e.to_string()))
    }
}

/// PEM header synthesis, matching the original's behavior of accepting
/// either a bare base64 body or a fully-headered PEM block.
pub mod pem {
    use super::*;

    /// If `input` already contains `-----BEGIN`, re-encode it through the
    /// `pem` crate (normalizing line endings/wrapping); otherwise treat it
    /// as a bare base64 body, decode it, and encode a fresh PEM block with
    /// `label` headers.
    pub fn normalize(input: &str, label: &str) -> Result<String> {
        let trimmed = input.trim();
        if trimmed.contains("-----BEGIN") {
            let parsed = ::pem::parse(trimmed).map_err(|e| CoreError::InvalidPem(e.to_string()))?;
            return Ok(::pem::encode(&parsed));
        }
        if trimmed.is_empty() {
            return Err(CoreError::InvalidPem("empty key material".into()));
        }
        let body: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        let contents = base64::engine::general_purpose::STANDARD
            .decode(&body)
            .map_err(|e| CoreError::InvalidPem(e.to_string()))?;
        let pem = ::pem::Pem::new(label, contents);
        Ok(::pem::encode(&pem))
    }
}

/// Cryptographically secure random string generation.
pub mod random {
    use rand::RngCore;

    const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    const DIGITS: &[u8] = b"0123456789";

    fn random_string(length: usize, alphabet: &[u8]) -> String {
        let mut rng = rand::rngs::OsRng;
        (0..length)
            .map(|_| {
                let idx = (rng.next_u32() as usize) % alphabet.len();
                alphabet[idx] as char
            })
            .collect()
    }

    /// A cryptographically secure alphanumeric string of `length` characters.
    /// Used for service-authentication nonces.
    pub fn alphanumeric(length: usize) -> String {
        random_string(length, ALPHANUMERIC)
    }

    /// A cryptographically secure decimal-digit string of `length`
    /// characters (may have a leading zero). Used for SIWE nonces.
    pub fn numeric(length: usize) -> String {
        random_string(length, DIGITS)
    }
}

/// Trim whitespace and ensure a `0x` prefix, matching the original's
/// `NormalizeHexString` helper.
pub fn normalize_hex_string(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    }
}
