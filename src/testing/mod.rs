//! Unified testing utilities for keeprs
//!
//! Consolidates fixtures and mock collaborators behind the `testing` cargo
//! feature so integration tests and downstream consumers can exercise the
//! lifecycle without a real identity provider.
//!
//! # Modules
//!
//! - [`fixtures`] - Pre-built test data (payloads, token sets, settings)
//! - [`mock`] - Mock token exchange for isolated lifecycle tests

pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use mock::MockTokenExchange;

/// Common test constants
pub mod constants {
    /// Secret used to derive the test encryption key
    pub const TEST_SECRET: &[u8] = b"test_secret_key_32_chars_minimum";

    /// Issuer origin for test settings
    pub const TEST_ISSUER_URL: &str = "https://idp.test.example.com";

    /// OAuth client identifier for test settings
    pub const TEST_CLIENT_ID: &str = "test-client-id";
}
