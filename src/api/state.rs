//! Shared state handed to every handler.

use std::sync::Arc;

use crate::crypto::SessionKeys;
use crate::ledger::{Ledger, LedgerError};

use super::error::ApiResult;

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    ledger: Ledger,
    sessions: SessionKeys,
    webhook_secret: Vec<u8>,
    require_signatures: bool,
}

impl AppState {
    /// Create the state
    #[must_use]
    pub fn new(
        ledger: Ledger,
        sessions: SessionKeys,
        webhook_secret: impl Into<Vec<u8>>,
        require_signatures: bool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                ledger,
                sessions,
                webhook_secret: webhook_secret.into(),
                require_signatures,
            }),
        }
    }

    /// The ledger
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Session token keys
    #[must_use]
    pub fn sessions(&self) -> &SessionKeys {
        &self.inner.sessions
    }

    /// Shared secret for webhook signatures
    #[must_use]
    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    /// Reject unsigned webhooks
    #[must_use]
    pub fn require_signatures(&self) -> bool {
        self.inner.require_signatures
    }

    /// Run a ledger operation on the blocking pool; store access may block
    /// on disk.
    pub async fn with_ledger<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = self.inner.ledger.clone();
        let result = tokio::task::spawn_blocking(move || f(&ledger)).await?;
        Ok(result?)
    }
}
