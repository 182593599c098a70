//! Test fixtures providing pre-built test objects
//!
//! Commonly used payloads, token sets, and managers so individual tests
//! don't rebuild the same data by hand.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;

use crate::exchange::{TokenExchange, TokenSet};
use crate::models::{cookie_expiration, SessionIdentity, SessionPayload};
use crate::session::SessionManager;
use crate::settings::KeeprsSettings;

use super::constants::{TEST_CLIENT_ID, TEST_ISSUER_URL, TEST_SECRET};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// A session payload whose access credential is still fresh
    #[must_use]
    pub fn payload() -> SessionPayload {
        let now = Utc::now().timestamp();
        SessionPayload::new("test-refresh-token", 3600, now, SessionIdentity::default())
    }

    /// A session payload whose access credential went stale an hour ago
    #[must_use]
    pub fn expired_payload() -> SessionPayload {
        let now = Utc::now().timestamp();
        let mut payload = Self::payload();
        payload.expires_at = cookie_expiration(0, now - 3600);
        payload
    }

    /// A provider token response issued just now
    #[must_use]
    pub fn token_set() -> TokenSet {
        TokenSet {
            access_token: Self::entitled_access_token(),
            refresh_token: None,
            expires_in: 3600,
            created_at: Utc::now().timestamp(),
        }
    }

    /// An access credential carrying the scoping claim set to `true`
    #[must_use]
    pub fn entitled_access_token() -> String {
        Self::unsigned_jwt(&serde_json::json!({"sub": "u1", "bolt": true}))
    }

    /// Build an unsigned three-part JWT around the given claim set
    #[must_use]
    pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.unsigned")
    }

    /// Settings pointing at a fake provider, secrets filled in
    #[must_use]
    pub fn settings() -> KeeprsSettings {
        let mut settings = KeeprsSettings::default();
        settings.identity_provider.issuer_url = TEST_ISSUER_URL.to_string();
        settings.identity_provider.client_id = TEST_CLIENT_ID.to_string();
        settings.session.transport_secret = "test-transport-secret".to_string();
        settings.session.encryption_secret = String::from_utf8_lossy(TEST_SECRET).into_owned();
        settings.cookies.secure = false;
        settings
    }

    /// A session manager over the given exchange with test key material
    #[must_use]
    pub fn manager(exchange: Arc<dyn TokenExchange>) -> SessionManager {
        SessionManager::new(TEST_SECRET, false, exchange)
    }
}
