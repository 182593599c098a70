use actix_web::cookie::{time::Duration, Cookie, SameSite};
use anyhow::Result;
use log::warn;

use crate::crypto::{decrypt_data, encrypt_data};
use crate::models::SessionPayload;

/// Name of the opaque session artifact cookie
pub const COOKIE_NAME: &str = "keeprs_session";

/// Fixed transport-level max-age for committed sessions, independent of the
/// access credential's own expiry; the refresh token's validity is assumed
/// to exceed this
pub const SESSION_COOKIE_MAX_AGE_DAYS: i64 = 30;

/// Instruction for the transport collaborator after a lifecycle operation
///
/// The controller never touches response headers itself; the caller renders
/// the instruction into its own response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInstruction {
    /// Leave the session artifact untouched
    Unchanged,
    /// Commit an updated encrypted artifact with the given max-age
    Commit { value: String, max_age: Duration },
    /// Destroy the session artifact
    Destroy,
}

impl SessionInstruction {
    /// Commit with the fixed 30-day transport max-age
    #[must_use]
    pub fn commit(value: String) -> Self {
        Self::Commit {
            value,
            max_age: Duration::days(SESSION_COOKIE_MAX_AGE_DAYS),
        }
    }
}

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age: Duration::days(SESSION_COOKIE_MAX_AGE_DAYS),
        }
    }
}

/// Factory for sealing, opening, and rendering the encrypted session artifact
#[derive(Clone)]
pub struct CookieFactory {
    encryption_key: [u8; 32],
    cookie_secure: bool,
}

impl CookieFactory {
    #[must_use]
    pub const fn new(encryption_key: [u8; 32], cookie_secure: bool) -> Self {
        Self {
            encryption_key,
            cookie_secure,
        }
    }

    /// Encrypt a payload into the opaque artifact value
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn seal(&self, payload: &SessionPayload) -> Result<String> {
        encrypt_data(payload, &self.encryption_key)
    }

    /// Decrypt an artifact value, treating every failure as "no session"
    ///
    /// A malformed, truncated, or tampered artifact is logged and mapped to
    /// `None`; corruption never unwinds past this boundary.
    #[must_use]
    pub fn open(&self, value: &str) -> Option<SessionPayload> {
        match decrypt_data::<SessionPayload>(value, &self.encryption_key) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Failed to decrypt session artifact, treating as no session: {e}");
                None
            }
        }
    }

    /// Render an instruction into the cookie the caller should attach
    ///
    /// `Unchanged` renders to nothing, `Commit` to a fresh session cookie,
    /// `Destroy` to an expired cookie that clears the artifact.
    #[must_use]
    pub fn render(&self, instruction: &SessionInstruction) -> Option<Cookie<'static>> {
        match instruction {
            SessionInstruction::Unchanged => None,
            SessionInstruction::Commit { value, max_age } => Some(self.build_cookie(
                value.clone(),
                CookieOptions {
                    max_age: *max_age,
                    ..Default::default()
                },
            )),
            SessionInstruction::Destroy => Some(self.create_expired_cookie()),
        }
    }

    /// Create an expired cookie to clear the session artifact
    #[must_use]
    pub fn create_expired_cookie(&self) -> Cookie<'static> {
        create_expired_cookie(COOKIE_NAME, self.cookie_secure)
    }

    fn build_cookie(&self, value: String, options: CookieOptions) -> Cookie<'static> {
        Cookie::build(COOKIE_NAME.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.cookie_secure && options.secure)
            .same_site(options.same_site)
            .path(options.path)
            .max_age(options.max_age)
            .finish()
    }
}

/// Create an expired cookie to clear a specific cookie
#[must_use]
pub fn create_expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_owned(), "")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(-1))
        .finish()
}
