//! Mock objects and fake implementations for testing
//!
//! Provides a canned [`TokenExchange`] so lifecycle tests run without any
//! network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::exchange::{ExchangeError, TokenExchange, TokenSet};

/// Programmable [`TokenExchange`] double
///
/// Clones share call counters, so a test can hand one clone to the
/// `SessionManager` and keep another for assertions.
#[derive(Clone)]
pub struct MockTokenExchange {
    refresh_response: Option<Result<TokenSet, ExchangeError>>,
    revoke_response: Result<(), ExchangeError>,
    refresh_calls: Arc<AtomicUsize>,
    revoke_calls: Arc<AtomicUsize>,
}

impl MockTokenExchange {
    /// An exchange that must never be asked to refresh
    ///
    /// # Panics
    ///
    /// The `refresh` implementation panics when called.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::build(None, Ok(()))
    }

    /// An exchange whose refresh succeeds with the given tokens
    #[must_use]
    pub fn refreshing(tokens: TokenSet) -> Self {
        Self::build(Some(Ok(tokens)), Ok(()))
    }

    /// An exchange whose refresh fails with the given error
    #[must_use]
    pub fn refresh_failing(error: ExchangeError) -> Self {
        Self::build(Some(Err(error)), Ok(()))
    }

    /// An exchange whose revocation fails with the given error
    #[must_use]
    pub fn revoke_failing(error: ExchangeError) -> Self {
        Self::build(None, Err(error))
    }

    fn build(
        refresh_response: Option<Result<TokenSet, ExchangeError>>,
        revoke_response: Result<(), ExchangeError>,
    ) -> Self {
        Self {
            refresh_response,
            revoke_response,
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            revoke_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of refresh calls observed across all clones
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of revoke calls observed across all clones
    #[must_use]
    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for MockTokenExchange {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, ExchangeError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_response
            .clone()
            .expect("unexpected refresh call on MockTokenExchange::unreachable")
    }

    async fn revoke(&self, _refresh_token: &str) -> Result<(), ExchangeError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revoke_response.clone()
    }
}
