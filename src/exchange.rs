//! Token exchange against the identity provider's token endpoint
//!
//! Two operations only: silent refresh of an expired access credential and
//! best-effort revocation on logout. Authorization-code exchange and PKCE are
//! deliberately not implemented here; sessions enter this crate already
//! holding a refresh token.

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::claims::{self, ClaimError};
use crate::settings::{ConfigError, KeeprsSettings};

/// Token endpoint path relative to the issuer origin
const TOKEN_PATH: &str = "/oauth/token";

/// Revocation endpoint path relative to the issuer origin
const REVOKE_PATH: &str = "/oauth/revoke";

/// Successful refresh response from the provider
///
/// `refresh_token` is present only when the provider rotates refresh tokens;
/// the other fields are required and their absence is a malformed response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub created_at: i64,
}

/// Hard failures of a refresh call and reportable failures of a revoke call
///
/// Every variant of this error destroys the session when surfaced from
/// `refresh`; callers of `revoke` log and swallow it instead.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    #[error("token endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error talking to token endpoint: {0}")]
    Network(String),
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
    #[error("access credential is not entitled to this application")]
    EntitlementRevoked,
    #[error("access credential claims could not be decoded: {0}")]
    Claim(#[from] ClaimError),
}

/// Seam between the lifecycle controller and the provider's token endpoint
///
/// The controller only ever talks to this trait, so tests can substitute a
/// mock without any network.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange a refresh token for a new access credential
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The network call fails
    /// - The provider responds with a non-2xx status
    /// - The response body is missing required fields
    /// - The returned access credential fails the entitlement check
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ExchangeError>;

    /// Revoke a refresh token that is about to be discarded
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or non-2xx status. Callers treat
    /// revocation as advisory cleanup and never let this error block logout.
    async fn revoke(&self, refresh_token: &str) -> Result<(), ExchangeError>;
}

/// `reqwest`-backed [`TokenExchange`] implementation
#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    token_url: Url,
    revoke_url: Url,
    client_id: String,
    entitlement_claim: String,
}

impl IdentityClient {
    /// Build a client from settings, resolving endpoint URLs from the
    /// configured issuer origin
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the issuer URL cannot be parsed.
    pub fn new(settings: &KeeprsSettings) -> Result<Self, ConfigError> {
        let issuer = Url::parse(&settings.identity_provider.issuer_url)?;
        let token_url = issuer.join(TOKEN_PATH)?;
        let revoke_url = issuer.join(REVOKE_PATH)?;

        Ok(Self {
            http: reqwest::Client::new(),
            token_url,
            revoke_url,
            client_id: settings.identity_provider.client_id.clone(),
            entitlement_claim: settings.identity_provider.entitlement_claim.clone(),
        })
    }

    /// Parse a 2xx token-endpoint body, treating missing fields as malformed
    fn parse_token_body(body: &str) -> Result<TokenSet, ExchangeError> {
        serde_json::from_str(body).map_err(|e| ExchangeError::MalformedResponse(e.to_string()))
    }

    /// Gate a refreshed credential on the application-scoping claim
    ///
    /// A refresh that succeeds at the HTTP level but returns a credential
    /// without entitlement is a failed refresh, so a user who lost access is
    /// never kept alive silently.
    fn validate_entitlement(&self, tokens: &TokenSet) -> Result<(), ExchangeError> {
        if claims::is_authorized(&tokens.access_token, &self.entitlement_claim)? {
            Ok(())
        } else {
            Err(ExchangeError::EntitlementRevoked)
        }
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn revoke_url(&self) -> &Url {
        &self.revoke_url
    }
}

#[async_trait]
impl TokenExchange for IdentityClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ExchangeError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        debug!("Refreshing access credential at {}", self.token_url);
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let tokens = Self::parse_token_body(&body)?;
        self.validate_entitlement(&tokens)?;

        info!("Access credential refreshed, expires_in={}", tokens.expires_in);
        Ok(tokens)
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), ExchangeError> {
        let params = [
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", self.client_id.as_str()),
        ];

        debug!("Revoking refresh token at {}", self.revoke_url);
        let response = self
            .http
            .post(self.revoke_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::KeeprsSettings;
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;

    fn client() -> IdentityClient {
        let mut settings = KeeprsSettings::default();
        settings.identity_provider.issuer_url = "https://idp.example.com".to_string();
        settings.identity_provider.client_id = "client-123".to_string();
        IdentityClient::new(&settings).unwrap()
    }

    fn access_token_with(claims: &serde_json::Value) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn test_endpoint_urls_resolved_from_issuer() {
        let client = client();
        assert_eq!(
            client.token_url().as_str(),
            "https://idp.example.com/oauth/token"
        );
        assert_eq!(
            client.revoke_url().as_str(),
            "https://idp.example.com/oauth/revoke"
        );
    }

    #[test]
    fn test_invalid_issuer_url_is_config_error() {
        let mut settings = KeeprsSettings::default();
        settings.identity_provider.issuer_url = "not a url".to_string();
        assert!(IdentityClient::new(&settings).is_err());
    }

    #[test]
    fn test_parse_token_body_success() {
        let body = json!({
            "access_token": "at",
            "refresh_token": "rt2",
            "expires_in": 7200,
            "created_at": 1_700_000_000,
            "token_type": "Bearer"
        })
        .to_string();

        let tokens = IdentityClient::parse_token_body(&body).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt2"));
        assert_eq!(tokens.expires_in, 7200);
        assert_eq!(tokens.created_at, 1_700_000_000);
    }

    #[test]
    fn test_parse_token_body_without_rotation() {
        let body = json!({
            "access_token": "at",
            "expires_in": 7200,
            "created_at": 1_700_000_000
        })
        .to_string();

        let tokens = IdentityClient::parse_token_body(&body).unwrap();
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_parse_token_body_missing_fields_is_malformed() {
        let body = json!({"access_token": "at"}).to_string();
        let result = IdentityClient::parse_token_body(&body);
        assert!(matches!(result, Err(ExchangeError::MalformedResponse(_))));

        let result = IdentityClient::parse_token_body("not json");
        assert!(matches!(result, Err(ExchangeError::MalformedResponse(_))));
    }

    #[test]
    fn test_validate_entitlement_accepts_true_claim() {
        let client = client();
        let tokens = TokenSet {
            access_token: access_token_with(&json!({"bolt": true})),
            refresh_token: None,
            expires_in: 3600,
            created_at: 0,
        };
        assert!(client.validate_entitlement(&tokens).is_ok());
    }

    #[test]
    fn test_validate_entitlement_rejects_false_or_absent_claim() {
        let client = client();

        let tokens = TokenSet {
            access_token: access_token_with(&json!({"bolt": false})),
            refresh_token: None,
            expires_in: 3600,
            created_at: 0,
        };
        assert!(matches!(
            client.validate_entitlement(&tokens),
            Err(ExchangeError::EntitlementRevoked)
        ));

        let tokens = TokenSet {
            access_token: access_token_with(&json!({"sub": "u1"})),
            refresh_token: None,
            expires_in: 3600,
            created_at: 0,
        };
        assert!(matches!(
            client.validate_entitlement(&tokens),
            Err(ExchangeError::EntitlementRevoked)
        ));
    }

    #[test]
    fn test_validate_entitlement_decode_failure_is_claim_error() {
        let client = client();
        let tokens = TokenSet {
            access_token: "garbage".to_string(),
            refresh_token: None,
            expires_in: 3600,
            created_at: 0,
        };
        assert!(matches!(
            client.validate_entitlement(&tokens),
            Err(ExchangeError::Claim(_))
        ));
    }
}
