// src/utils/validation.rs
//! Input validation and normalisation for claim requests.

use crate::error::ClaimError;
use crate::models::claim::IdentityKind;

/// Longest handle the social network accepts.
const MAX_HANDLE_LEN: usize = 15;
/// Upper bound on an email address (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Checks a DID has the `did:<method>:<id>` shape.
pub fn validate_identifier(identifier: &str) -> Result<(), ClaimError> {
    let mut parts = identifier.splitn(3, ':');
    let scheme = parts.next().unwrap_or_default();
    let method = parts.next().unwrap_or_default();
    let id = parts.next().unwrap_or_default();

    let method_ok = !method.is_empty()
        && method
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if scheme != "did" || !method_ok || id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(ClaimError::InvalidInput(format!(
            "'{}' is not a decentralized identifier",
            identifier
        )));
    }
    Ok(())
}

/// Normalises and validates an identity value for its kind.
///
/// - Handles lose a leading `@` and are lower-cased; 1-15 chars of `[a-z0-9_]`.
/// - Email addresses are trimmed and lower-cased; one `@`, non-empty local
///   part, and a dotted domain.
pub fn normalize_identity_value(kind: IdentityKind, value: &str) -> Result<String, ClaimError> {
    match kind {
        IdentityKind::SocialHandle => normalize_handle(value),
        IdentityKind::EmailAddress => normalize_email(value),
    }
}

fn normalize_handle(value: &str) -> Result<String, ClaimError> {
    let handle = value.trim().trim_start_matches('@').to_lowercase();
    let valid = !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LEN
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ClaimError::InvalidInput(format!("invalid handle '{}'", value)));
    }
    Ok(handle)
}

fn normalize_email(value: &str) -> Result<String, ClaimError> {
    let email = value.trim().to_lowercase();
    let invalid = || ClaimError::InvalidInput("invalid email address".to_string());

    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(email)
}

/// Masks an email address for logs: `alice@example.com` -> `a***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().unwrap_or('*');
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}
