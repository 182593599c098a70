use serde::{Deserialize, Serialize};

use crate::exchange::TokenSet;

/// Seconds subtracted from the provider-reported expiry so sessions refresh
/// proactively, absorbing clock drift and in-flight request latency
pub const REFRESH_EXPIRY_SKEW_SECS: i64 = 600;

/// Compute the payload expiry in epoch milliseconds from a token response
///
/// The provider reports `expires_in` (seconds of validity) and `created_at`
/// (epoch seconds of issuance); the stored expiry is pulled forward by the
/// skew buffer: `(expires_in + created_at - skew) * 1000`.
#[must_use]
pub const fn cookie_expiration(expires_in: i64, created_at: i64) -> i64 {
    (expires_in + created_at - REFRESH_EXPIRY_SKEW_SECS) * 1000
}

/// The only persisted session entity, carried entirely in the encrypted
/// client-side artifact
///
/// Field keys are deliberately short: the serialized form is encrypted and
/// base64-encoded into a cookie, so every byte of plaintext costs wire size.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionPayload {
    /// Long-lived credential exchanged for new access credentials
    #[serde(rename = "rt")]
    pub refresh_token: String,

    /// Epoch milliseconds after which the access credential is stale
    #[serde(rename = "exp")]
    pub expires_at: i64,

    /// Identity correlation id
    #[serde(rename = "uid", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Analytics routing key tied to identity
    #[serde(rename = "seg", default, skip_serializing_if = "Option::is_none")]
    pub segment_key: Option<String>,
}

impl SessionPayload {
    /// Build a fresh payload from newly issued tokens (login)
    #[must_use]
    pub fn new(
        refresh_token: &str,
        expires_in: i64,
        created_at: i64,
        identity: SessionIdentity,
    ) -> Self {
        Self {
            refresh_token: refresh_token.to_string(),
            expires_at: cookie_expiration(expires_in, created_at),
            user_id: identity.user_id,
            segment_key: identity.segment_key,
        }
    }

    /// Whether the access credential must be refreshed before the session
    /// can be trusted
    #[must_use]
    pub const fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Mutate the payload in place after a successful silent refresh
    ///
    /// Identity fields are carried over unchanged; the expiry is bumped, and
    /// a rotated refresh token from the provider replaces the stored one when
    /// present.
    pub fn renew(&mut self, tokens: &TokenSet) {
        if let Some(rotated) = &tokens.refresh_token {
            self.refresh_token.clone_from(rotated);
        }
        self.expires_at = cookie_expiration(tokens.expires_in, tokens.created_at);
    }

    /// Read-only identity view of the payload
    #[must_use]
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id.clone(),
            segment_key: self.segment_key.clone(),
        }
    }
}

/// Optional identity fields attached to a session at login
///
/// Both fields are `None` when no session exists.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: Option<String>,
    pub segment_key: Option<String>,
}

impl SessionIdentity {
    #[must_use]
    pub fn new(user_id: Option<&str>, segment_key: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(ToString::to_string),
            segment_key: segment_key.map(ToString::to_string),
        }
    }
}
