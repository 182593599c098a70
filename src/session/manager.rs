//! Session lifecycle controller
//!
//! State machine over one request lifecycle. Each operation loads the opaque
//! artifact handed over by the transport collaborator, decides what the
//! session is worth, and answers with a [`SessionInstruction`] the caller
//! applies to its response. Nothing is shared between requests except the
//! static key material, so two concurrent requests for the same end user may
//! both refresh; the provider's rotation policy governs that race and it is
//! deliberately not deduplicated here.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{debug, warn};

use crate::crypto::derive_encryption_key;
use crate::exchange::TokenExchange;
use crate::models::{SessionIdentity, SessionPayload};
use crate::session::cookie::CookieFactory;
use crate::session::SessionInstruction;
use crate::settings::KeeprsSettings;

/// Fixed login entry point the logout flow redirects to
pub const LOGIN_PATH: &str = "/login";

/// Session state observed during one request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No artifact, or an artifact that cannot be trusted
    NoSession,
    /// Access credential still fresh, or freshly renewed
    Valid,
    /// Access credential stale but a refresh token is on hand
    ExpiredRefreshable,
    /// Refresh was attempted and failed; the session is gone
    Dead,
}

/// Result of an authentication check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub state: AuthState,
    pub instruction: SessionInstruction,
}

impl AuthOutcome {
    /// Whether the caller may treat the request as authenticated
    #[must_use]
    pub const fn authenticated(&self) -> bool {
        matches!(self.state, AuthState::Valid)
    }
}

/// Result of a logout: always a destroy plus a redirect to login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub redirect_to: &'static str,
    pub instruction: SessionInstruction,
}

/// Stateless controller over the encrypted session artifact
#[derive(Clone)]
pub struct SessionManager {
    cookie_factory: CookieFactory,
    exchange: Arc<dyn TokenExchange>,
}

impl SessionManager {
    /// Create a controller from raw secret material
    #[must_use]
    pub fn new(secret: &[u8], cookie_secure: bool, exchange: Arc<dyn TokenExchange>) -> Self {
        let encryption_key = derive_encryption_key(secret);
        Self {
            cookie_factory: CookieFactory::new(encryption_key, cookie_secure),
            exchange,
        }
    }

    /// Create a controller wired from loaded settings
    #[must_use]
    pub fn from_settings(settings: &KeeprsSettings, exchange: Arc<dyn TokenExchange>) -> Self {
        Self::new(
            settings.session.encryption_secret.as_bytes(),
            settings.cookies.secure,
            exchange,
        )
    }

    /// Determine the authentication state for one request
    ///
    /// A fresh session answers `Valid` with no side effect. A stale session
    /// is silently refreshed: on success the payload's expiry is bumped (and
    /// a rotated refresh token adopted), the artifact re-encrypted, and the
    /// caller told to commit it; on any failure the discarded refresh token
    /// is revoked best-effort, the session destroyed, and the request
    /// reported unauthenticated. Refresh failures never surface as errors
    /// from this method.
    pub async fn authenticate(&self, artifact: Option<&str>) -> AuthOutcome {
        let Some(payload) = self.read_payload(artifact) else {
            return AuthOutcome {
                state: AuthState::NoSession,
                instruction: SessionInstruction::Destroy,
            };
        };

        let now_ms = Utc::now().timestamp_millis();
        if Self::classify(&payload, now_ms) == AuthState::Valid {
            return AuthOutcome {
                state: AuthState::Valid,
                instruction: SessionInstruction::Unchanged,
            };
        }

        debug!("Session expired, attempting silent refresh");
        match self.exchange.refresh(&payload.refresh_token).await {
            Ok(tokens) => {
                let mut renewed = payload;
                renewed.renew(&tokens);

                match self.cookie_factory.seal(&renewed) {
                    Ok(value) => AuthOutcome {
                        state: AuthState::Valid,
                        instruction: SessionInstruction::commit(value),
                    },
                    Err(e) => {
                        warn!("Failed to re-encrypt renewed session: {e}");
                        AuthOutcome {
                            state: AuthState::Dead,
                            instruction: SessionInstruction::Destroy,
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Silent refresh failed, destroying session: {e}");
                // The refresh token is about to be discarded; try to revoke it
                if let Err(revoke_err) = self.exchange.revoke(&payload.refresh_token).await {
                    debug!("Refresh token revocation failed (ignored): {revoke_err}");
                }
                AuthOutcome {
                    state: AuthState::Dead,
                    instruction: SessionInstruction::Destroy,
                }
            }
        }
    }

    /// Build and seal a brand-new session from freshly issued tokens (login)
    ///
    /// The commit carries the fixed 30-day transport max-age regardless of
    /// the access credential's own expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if payload encryption fails
    pub fn create_session(
        &self,
        refresh_token: &str,
        expires_in: i64,
        created_at: i64,
        identity: SessionIdentity,
    ) -> Result<SessionInstruction> {
        let payload = SessionPayload::new(refresh_token, expires_in, created_at, identity);
        let value = self.cookie_factory.seal(&payload)?;
        Ok(SessionInstruction::commit(value))
    }

    /// End the session: best-effort revoke, unconditional destroy, redirect
    /// to the login entry point
    ///
    /// Revocation uses the refresh token that is about to be discarded and
    /// never blocks logout; its failures are only recorded for diagnostics.
    /// Calling this without a session is a harmless no-op apart from the
    /// destroy instruction.
    pub async fn logout(&self, artifact: Option<&str>) -> LogoutOutcome {
        if let Some(payload) = self.read_payload(artifact) {
            if let Err(e) = self.exchange.revoke(&payload.refresh_token).await {
                debug!("Refresh token revocation failed (ignored): {e}");
            }
        }

        LogoutOutcome {
            redirect_to: LOGIN_PATH,
            instruction: SessionInstruction::Destroy,
        }
    }

    /// Read the identity fields of the current session, if any
    ///
    /// Pure read: no refresh is attempted and no instruction is produced.
    #[must_use]
    pub fn session_data(&self, artifact: Option<&str>) -> SessionIdentity {
        self.read_payload(artifact)
            .map(|payload| payload.identity())
            .unwrap_or_default()
    }

    /// Access the cookie factory for rendering instructions into cookies
    #[must_use]
    pub const fn cookie_factory(&self) -> &CookieFactory {
        &self.cookie_factory
    }

    /// Load and validate the payload, folding every defect into "no session"
    ///
    /// Absent artifact, decrypt failure, schema-invalid plaintext, and an
    /// empty refresh token all land here; none of them are errors.
    fn read_payload(&self, artifact: Option<&str>) -> Option<SessionPayload> {
        let value = artifact.filter(|v| !v.is_empty())?;
        let payload = self.cookie_factory.open(value)?;

        if payload.refresh_token.is_empty() {
            debug!("Session payload carries no refresh token, treating as no session");
            return None;
        }

        Some(payload)
    }

    /// Classify a readable payload against the clock
    fn classify(payload: &SessionPayload, now_ms: i64) -> AuthState {
        if payload.is_expired(now_ms) {
            AuthState::ExpiredRefreshable
        } else {
            AuthState::Valid
        }
    }
}
