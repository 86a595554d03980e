use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::account_service::AccountService;
use crate::completion_service::CompletionService;
use crate::error::AppServicesError;
use crate::session_service::SessionService;

/// Assembles the progression services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    accounts: Arc<AccountService>,
    sessions: Arc<SessionService>,
    completions: Arc<CompletionService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if connecting or migrating fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(clock, &storage))
    }

    /// Build services over process-local storage.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(clock, &Storage::in_memory())
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        let accounts = Arc::new(AccountService::new(
            clock,
            Arc::clone(&storage.accounts),
            Arc::clone(&storage.ledger),
        ));
        let sessions = Arc::new(SessionService::new(
            clock,
            Arc::clone(&storage.accounts),
            Arc::clone(&storage.sessions),
        ));
        let completions = Arc::new(CompletionService::new(
            clock,
            Arc::clone(&storage.accounts),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.completions),
            Arc::clone(&storage.ledger),
        ));

        Self {
            accounts,
            sessions,
            completions,
        }
    }

    #[must_use]
    pub fn accounts(&self) -> Arc<AccountService> {
        Arc::clone(&self.accounts)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn completions(&self) -> Arc<CompletionService> {
        Arc::clone(&self.completions)
    }
}
