use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// Fatal configuration failures
///
/// This is the only error class allowed to propagate out of the crate as a
/// hard failure: running with a missing secret would silently weaken the
/// confidentiality of every session.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required secret `{0}` in production")]
    MissingSecret(&'static str),
    #[error("invalid issuer URL: {0}")]
    InvalidIssuerUrl(#[from] url::ParseError),
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] basic_toml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeeprsSettings {
    pub application: ApplicationSettings,
    pub identity_provider: IdentityProviderSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Deployment environment name; `"production"` enables fail-closed
    /// secret validation
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderSettings {
    /// Origin of the identity provider; token endpoints are resolved
    /// relative to it
    pub issuer_url: String,
    /// Fixed OAuth client identifier sent on refresh and revoke calls
    pub client_id: String,
    /// Name of the boolean application-scoping claim checked on every
    /// refreshed access credential
    pub entitlement_claim: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Secret for the transport collaborator's own cookie signing
    pub transport_secret: String,
    /// Secret the payload codec derives its AES-256 key from
    pub encryption_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
        }
    }
}

impl Default for IdentityProviderSettings {
    fn default() -> Self {
        Self {
            issuer_url: "https://gitlab.com".to_string(),
            client_id: String::new(),
            entitlement_claim: "bolt".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transport_secret: String::new(),  // Generated outside production
            encryption_secret: String::new(), // Generated outside production
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true, // Default to secure cookies
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl KeeprsSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Priority, highest to lowest: environment variables, `Settings.toml`
    /// in the current directory, built-in defaults. Also loads a `.env`
    /// file and initializes the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The settings file cannot be read or parsed
    /// - A required secret is missing while running in production
    pub fn load() -> Result<Self, ConfigError> {
        Self::initialize_environment();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.ensure_secrets()?;

        Ok(settings)
    }

    /// Whether fail-closed secret validation applies
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.application.environment.eq_ignore_ascii_case("production")
    }

    /// Load .env and initialize logging
    fn initialize_environment() {
        Self::load_env_file();
        // The logger may already be installed when load() runs inside tests
        let _ = env_logger::try_init();
    }

    /// Load base settings from Settings.toml or use defaults
    fn load_base_settings() -> Result<Self, ConfigError> {
        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            let settings = basic_toml::from_str(&toml_content)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
            return Ok(settings);
        }

        Ok(Self::default())
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        if let Ok(environment) = std::env::var("APP_ENV") {
            settings.application.environment = environment;
        }
        if let Ok(issuer_url) = std::env::var("ISSUER_URL") {
            settings.identity_provider.issuer_url = issuer_url;
        }
        if let Ok(client_id) = std::env::var("OAUTH_CLIENT_ID") {
            settings.identity_provider.client_id = client_id;
        }
        if let Ok(claim) = std::env::var("ENTITLEMENT_CLAIM") {
            settings.identity_provider.entitlement_claim = claim;
        }
        if let Ok(secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(secure) = secure_str.parse::<bool>() {
                settings.cookies.secure = secure;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.logging.level = level;
        }

        Self::apply_secret_env_override("SESSION_SECRET", &mut settings.session.transport_secret);
        Self::apply_secret_env_override(
            "ENCRYPTION_SECRET",
            &mut settings.session.encryption_secret,
        );
    }

    /// Apply a secret environment override, ignoring empty values
    fn apply_secret_env_override(env_var: &str, target: &mut String) {
        if let Ok(secret) = std::env::var(env_var) {
            if !secret.is_empty() {
                *target = secret;
            }
        }
    }

    /// Validate secret material, generating development fallbacks
    ///
    /// Production fails closed: a missing secret is a fatal configuration
    /// error rather than an empty encryption key. Outside production a
    /// random secret is generated and loudly announced.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] in production when a secret
    /// is unconfigured.
    pub fn ensure_secrets(&mut self) -> Result<(), ConfigError> {
        let production = self.is_production();

        if self.session.transport_secret.is_empty() {
            if production {
                return Err(ConfigError::MissingSecret("SESSION_SECRET"));
            }
            self.session.transport_secret = Self::generate_random_secret();
            Self::warn_about_generated_secret("SESSION_SECRET");
        }

        if self.session.encryption_secret.is_empty() {
            if production {
                return Err(ConfigError::MissingSecret("ENCRYPTION_SECRET"));
            }
            self.session.encryption_secret = Self::generate_random_secret();
            Self::warn_about_generated_secret("ENCRYPTION_SECRET");
        }

        Ok(())
    }

    /// Generate a cryptographically secure random secret
    ///
    /// Generates 32 bytes (256 bits) of entropy for AES-256 compatibility
    fn generate_random_secret() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32]; // 256 bits for AES-256
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    /// Display warnings about using a generated secret
    fn warn_about_generated_secret(name: &str) {
        eprintln!("⚠️  WARNING: Using auto-generated {name}");
        eprintln!("   Sessions will not survive a restart of this process");
        eprintln!("🔒 For production use, set the {name} environment variable");
        eprintln!("   or configure it in Settings.toml");
    }

    /// Load environment variables from .env file if it exists
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_settings() {
        let settings = KeeprsSettings::default();

        assert_eq!(settings.application.environment, "development");
        assert!(!settings.is_production());
        assert_eq!(settings.identity_provider.issuer_url, "https://gitlab.com");
        assert_eq!(settings.identity_provider.entitlement_claim, "bolt");
        assert!(settings.session.transport_secret.is_empty());
        assert!(settings.session.encryption_secret.is_empty());
        assert!(settings.cookies.secure);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let toml = r#"
            [identity_provider]
            issuer_url = "https://idp.internal"
            client_id = "abc123"
        "#;

        let settings: KeeprsSettings = basic_toml::from_str(toml).unwrap();
        assert_eq!(settings.identity_provider.issuer_url, "https://idp.internal");
        assert_eq!(settings.identity_provider.client_id, "abc123");
        // Unspecified sections keep their defaults
        assert_eq!(settings.application.environment, "development");
        assert_eq!(settings.identity_provider.entitlement_claim, "bolt");
    }

    #[test]
    #[serial]
    fn test_env_override_priority() {
        std::env::set_var("ISSUER_URL", "https://idp.override.example.com");
        std::env::set_var("OAUTH_CLIENT_ID", "override-client");
        std::env::set_var("SESSION_SECRET", "env-transport-secret");

        let mut settings = KeeprsSettings::default();
        KeeprsSettings::apply_env_overrides(&mut settings);

        assert_eq!(
            settings.identity_provider.issuer_url,
            "https://idp.override.example.com"
        );
        assert_eq!(settings.identity_provider.client_id, "override-client");
        assert_eq!(settings.session.transport_secret, "env-transport-secret");

        std::env::remove_var("ISSUER_URL");
        std::env::remove_var("OAUTH_CLIENT_ID");
        std::env::remove_var("SESSION_SECRET");
    }

    #[test]
    #[serial]
    fn test_empty_env_secret_is_ignored() {
        std::env::set_var("SESSION_SECRET", "");

        let mut settings = KeeprsSettings::default();
        settings.session.transport_secret = "configured".to_string();
        KeeprsSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.session.transport_secret, "configured");

        std::env::remove_var("SESSION_SECRET");
    }

    #[test]
    fn test_production_fails_closed_without_secrets() {
        let mut settings = KeeprsSettings::default();
        settings.application.environment = "production".to_string();

        let result = settings.ensure_secrets();
        assert!(matches!(
            result,
            Err(ConfigError::MissingSecret("SESSION_SECRET"))
        ));
    }

    #[test]
    fn test_production_fails_closed_on_missing_encryption_secret() {
        let mut settings = KeeprsSettings::default();
        settings.application.environment = "Production".to_string();
        settings.session.transport_secret = "transport".to_string();

        let result = settings.ensure_secrets();
        assert!(matches!(
            result,
            Err(ConfigError::MissingSecret("ENCRYPTION_SECRET"))
        ));
    }

    #[test]
    fn test_production_with_secrets_passes() {
        let mut settings = KeeprsSettings::default();
        settings.application.environment = "production".to_string();
        settings.session.transport_secret = "transport".to_string();
        settings.session.encryption_secret = "encryption".to_string();

        assert!(settings.ensure_secrets().is_ok());
    }

    #[test]
    fn test_development_generates_fallback_secrets() {
        let mut settings = KeeprsSettings::default();
        settings.ensure_secrets().unwrap();

        assert!(!settings.session.transport_secret.is_empty());
        assert!(!settings.session.encryption_secret.is_empty());
        assert_ne!(
            settings.session.transport_secret,
            settings.session.encryption_secret
        );
    }
}
