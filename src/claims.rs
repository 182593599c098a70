//! Access-credential claim inspection
//!
//! Decodes the claim set of a JWT-shaped access credential without verifying
//! its signature: credentials handled here arrive directly from the identity
//! provider's TLS-protected token endpoint, so transport integrity is assumed.
//! Authorization is a single boolean predicate over an application-scoping
//! claim.

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use thiserror::Error;

/// Failure to decode a credential's claim set
///
/// Distinct from "unauthorized": an undecodable credential is an error, a
/// decodable credential without the scoping claim is simply not authorized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("credential is not a three-part JWT")]
    Format,
    #[error("credential payload is not valid base64")]
    Base64,
    #[error("credential payload is not valid UTF-8")]
    Utf8,
    #[error("credential payload is not valid JSON")]
    Json,
}

/// Decode the claim set of a JWT-shaped credential without signature
/// verification
///
/// # Errors
///
/// Returns a [`ClaimError`] if:
/// - The credential does not have 3 dot-separated parts
/// - Base64 decoding fails (both url-safe and standard alphabets)
/// - UTF-8 decoding fails
/// - JSON parsing fails
pub fn decode_claims(credential: &str) -> Result<Value, ClaimError> {
    let parts: Vec<&str> = credential.split('.').collect();
    if parts.len() != 3 {
        return Err(ClaimError::Format);
    }

    let payload_b64 = parts[1];
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| general_purpose::STANDARD.decode(payload_b64))
        .map_err(|_| ClaimError::Base64)?;

    let payload_str = String::from_utf8(payload_bytes).map_err(|_| ClaimError::Utf8)?;

    serde_json::from_str(&payload_str).map_err(|_| ClaimError::Json)
}

/// Check the application-scoping claim of an access credential
///
/// Returns `Ok(true)` only when the named claim is present and is boolean
/// `true`. Absence or any other value (including the string `"true"`) yields
/// `Ok(false)`.
///
/// # Errors
///
/// Returns a [`ClaimError`] when the credential cannot be decoded at all.
pub fn is_authorized(credential: &str, claim: &str) -> Result<bool, ClaimError> {
    let claims = decode_claims(credential)?;
    Ok(claims.get(claim).and_then(Value::as_bool) == Some(true))
}
