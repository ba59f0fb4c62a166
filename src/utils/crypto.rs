// src/utils/crypto.rs
//! Cryptographic helpers for proof checking.
//!
//! Social proofs are secp256k1 ECDSA signatures (SHA-256 digest, 64-byte
//! compact R || S, base64 encoded) made by the DID's controlling key.
//! Email proofs are short numeric codes, always compared in constant time.

use k256::ecdsa::signature::Verifier as _;
use k256::ecdsa::{Signature, VerifyingKey};
use rand::Rng;

/// Number of digits in an email verification code.
pub const EMAIL_CODE_DIGITS: usize = 6;

/// Builds the statement a DID controller signs to claim a social handle.
///
/// # Arguments
/// * `identifier` - The claiming DID
/// * `handle` - Normalised handle (lower-case, no leading `@`)
///
/// # Example
/// ```text
/// did:example:123 controls @alice
/// ```
pub fn social_statement(identifier: &str, handle: &str) -> String {
    format!("{} controls @{}", identifier, handle)
}

/// Decodes a base64 compact signature.
///
/// # Returns
/// - `Some(Signature)` for a well-formed 64-byte signature
/// - `None` for bad base64, wrong length, or an out-of-range scalar
pub fn decode_signature(encoded: &str) -> Option<Signature> {
    let bytes = base64::decode(encoded.trim()).ok()?;
    Signature::from_slice(&bytes).ok()
}

/// Verifies `signature` over `message` with the controller's key.
pub fn verify_signature(key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    key.verify(message, signature).is_ok()
}

/// Parses a hex-encoded SEC1 public key (compressed or uncompressed, `0x` optional).
pub fn parse_public_key_hex(encoded: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(encoded.trim_start_matches("0x")).ok()?;
    VerifyingKey::from_sec1_bytes(&bytes).ok()
}

/// Generates a zero-padded numeric email verification code.
pub fn generate_email_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..10u32.pow(EMAIL_CODE_DIGITS as u32));
    format!("{:0width$}", code, width = EMAIL_CODE_DIGITS)
}

/// Constant-time comparison of two codes.
pub fn codes_match(expected: &str, supplied: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(expected.as_bytes(), supplied.trim().as_bytes())
        .is_ok()
}
