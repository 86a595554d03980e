use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use training_core::model::{
    AccountDelta, AccountSnapshot, CompletionId, CompletionLedger, CompletionRecord,
    IdempotencyKey, LedgerError, NewCompletion, NewSession, ProgressionAccount, Session, SessionId,
    UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<LedgerError> for StorageError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Missing(_) => StorageError::NotFound,
            _ => StorageError::Conflict,
        }
    }
}

/// Result of a combined ledger + account write.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerWrite {
    /// The record as stored after the write (or as it was, for removals).
    pub completion: CompletionRecord,
    pub account_before: AccountSnapshot,
    pub account_after: ProgressionAccount,
}

/// Consistent read of an account together with every completion it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub account: ProgressionAccount,
    pub completions: Vec<CompletionRecord>,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Persist a freshly registered account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user already has an account.
    async fn create_account(&self, account: &ProgressionAccount) -> Result<(), StorageError>;

    /// Fetch an account by user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_account(&self, user_id: UserId)
    -> Result<Option<ProgressionAccount>, StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the owner has no account.
    async fn insert_session(&self, session: NewSession) -> Result<Session, StorageError>;

    /// Fetch a session by id, deleted or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// Save an existing session. Only active sessions are writable, so a
    /// stale copy can never bring a soft-deleted session back.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist or is
    /// already soft-deleted.
    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Sessions of a user that are not soft-deleted, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn list_active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, StorageError>;
}

#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_completion(
        &self,
        id: CompletionId,
    ) -> Result<Option<CompletionRecord>, StorageError>;

    /// Full history of a session, whatever its visibility.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn session_ledger(&self, session_id: SessionId)
    -> Result<CompletionLedger, StorageError>;

    /// Completions of a user with `from <= completed_at < until`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn completions_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: IdempotencyKey,
    ) -> Result<Option<CompletionRecord>, StorageError>;
}

/// Writes that touch a session ledger and the owner's account together.
///
/// Implementations apply both halves atomically: either the ledger change and
/// the account delta are both visible, or neither is.
#[async_trait]
pub trait LedgerPersistence: Send + Sync {
    /// Append a completion to an active session owned by the completion's user
    /// and credit the account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing, deleted, or
    /// owned by someone else, or if the account is missing.
    /// Returns `StorageError::Conflict` if the idempotency key is already used.
    async fn append_completion(
        &self,
        completion: NewCompletion,
        credit: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError>;

    /// Replace a completion's content and apply the content diff.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record is gone, or
    /// `StorageError::Conflict` if it is no longer at `expected_revision`.
    async fn replace_completion(
        &self,
        updated: &CompletionRecord,
        expected_revision: u64,
        diff: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError>;

    /// Remove a completion (which must still be at its current revision) and
    /// debit the account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record is gone, or
    /// `StorageError::Conflict` if it was revised meanwhile.
    async fn remove_completion(
        &self,
        record: &CompletionRecord,
        debit: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError>;

    /// Read an account and all of its completions from one consistent view.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account is missing.
    async fn ledger_snapshot(&self, user_id: UserId) -> Result<LedgerSnapshot, StorageError>;

    /// Overwrite an account's aggregates if it is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account is missing, or
    /// `StorageError::Conflict` if its version moved.
    async fn overwrite_totals(
        &self,
        user_id: UserId,
        expected_version: u64,
        totals: &AccountSnapshot,
        at: DateTime<Utc>,
    ) -> Result<ProgressionAccount, StorageError>;
}

//
// ─── IN-MEMORY ────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<UserId, ProgressionAccount>,
    sessions: HashMap<SessionId, Session>,
    ledgers: HashMap<SessionId, CompletionLedger>,
    completion_sessions: HashMap<CompletionId, SessionId>,
    idempotency: HashMap<(UserId, IdempotencyKey), CompletionId>,
    next_session_id: u64,
    next_completion_id: u64,
}

impl MemoryState {
    fn completion(&self, id: CompletionId) -> Option<&CompletionRecord> {
        let session_id = self.completion_sessions.get(&id)?;
        self.ledgers.get(session_id)?.get(id)
    }

    fn ledger_mut(&mut self, session_id: SessionId) -> Result<&mut CompletionLedger, StorageError> {
        self.ledgers
            .get_mut(&session_id)
            .ok_or(StorageError::NotFound)
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All state sits behind one mutex, so every operation (including the
/// ledger + account pair) runs as a single writer.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn create_account(&self, account: &ProgressionAccount) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.accounts.contains_key(&account.user_id()) {
            return Err(StorageError::Conflict);
        }
        guard.accounts.insert(account.user_id(), account.clone());
        Ok(())
    }

    async fn get_account(
        &self,
        user_id: UserId,
    ) -> Result<Option<ProgressionAccount>, StorageError> {
        Ok(self.lock()?.accounts.get(&user_id).cloned())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, session: NewSession) -> Result<Session, StorageError> {
        let mut guard = self.lock()?;
        if !guard.accounts.contains_key(&session.user_id) {
            return Err(StorageError::NotFound);
        }
        guard.next_session_id += 1;
        let id = SessionId::new(guard.next_session_id);
        let session = session.into_session(id);
        guard.sessions.insert(id, session.clone());
        guard.ledgers.insert(id, CompletionLedger::new(id));
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .sessions
            .get_mut(&session.id())
            .filter(|stored| !stored.is_deleted())
            .ok_or(StorageError::NotFound)?;
        *slot = session.clone();
        Ok(())
    }

    async fn list_active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        let mut sessions: Vec<Session> = guard
            .sessions
            .values()
            .filter(|s| s.is_owned_by(user_id) && !s.is_deleted())
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.created_at(), s.id()));
        Ok(sessions)
    }
}

#[async_trait]
impl CompletionRepository for InMemoryRepository {
    async fn get_completion(
        &self,
        id: CompletionId,
    ) -> Result<Option<CompletionRecord>, StorageError> {
        Ok(self.lock()?.completion(id).cloned())
    }

    async fn session_ledger(
        &self,
        session_id: SessionId,
    ) -> Result<CompletionLedger, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .ledgers
            .get(&session_id)
            .cloned()
            .unwrap_or_else(|| CompletionLedger::new(session_id)))
    }

    async fn completions_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<CompletionRecord> = guard
            .ledgers
            .values()
            .flat_map(CompletionLedger::records)
            .filter(|r| r.is_owned_by(user_id))
            .filter(|r| r.completed_at() >= from && r.completed_at() < until)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.completed_at(), r.id()));
        Ok(out)
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: IdempotencyKey,
    ) -> Result<Option<CompletionRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .idempotency
            .get(&(user_id, key))
            .and_then(|id| guard.completion(*id))
            .cloned())
    }
}

#[async_trait]
impl LedgerPersistence for InMemoryRepository {
    async fn append_completion(
        &self,
        completion: NewCompletion,
        credit: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let session = state
            .sessions
            .get(&completion.session_id)
            .ok_or(StorageError::NotFound)?;
        if session.is_deleted() || !session.is_owned_by(completion.user_id) {
            return Err(StorageError::NotFound);
        }
        if !state.accounts.contains_key(&completion.user_id) {
            return Err(StorageError::NotFound);
        }
        if let Some(key) = completion.idempotency_key {
            if state.idempotency.contains_key(&(completion.user_id, key)) {
                return Err(StorageError::Conflict);
            }
        }

        let id = CompletionId::new(state.next_completion_id + 1);
        let record = completion.into_record(id);
        state.ledger_mut(record.session_id())?.append(record.clone())?;
        state.next_completion_id += 1;
        state.completion_sessions.insert(id, record.session_id());
        if let Some(key) = record.idempotency_key() {
            state.idempotency.insert((record.user_id(), key), id);
        }

        let account = state
            .accounts
            .get_mut(&record.user_id())
            .ok_or(StorageError::NotFound)?;
        let account_before = account.snapshot();
        account.apply(credit, at);

        Ok(LedgerWrite {
            completion: record,
            account_before,
            account_after: account.clone(),
        })
    }

    async fn replace_completion(
        &self,
        updated: &CompletionRecord,
        expected_revision: u64,
        diff: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if !state.accounts.contains_key(&updated.user_id()) {
            return Err(StorageError::NotFound);
        }
        let stored = state.completion(updated.id()).ok_or(StorageError::NotFound)?;
        if !stored.is_owned_by(updated.user_id()) {
            return Err(StorageError::NotFound);
        }
        state
            .ledger_mut(updated.session_id())?
            .replace(updated.clone(), expected_revision)?;

        let account = state
            .accounts
            .get_mut(&updated.user_id())
            .ok_or(StorageError::NotFound)?;
        let account_before = account.snapshot();
        account.apply(diff, at);

        Ok(LedgerWrite {
            completion: updated.clone(),
            account_before,
            account_after: account.clone(),
        })
    }

    async fn remove_completion(
        &self,
        record: &CompletionRecord,
        debit: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if !state.accounts.contains_key(&record.user_id()) {
            return Err(StorageError::NotFound);
        }
        let stored = state.completion(record.id()).ok_or(StorageError::NotFound)?;
        if !stored.is_owned_by(record.user_id()) {
            return Err(StorageError::NotFound);
        }
        let removed = state
            .ledger_mut(record.session_id())?
            .remove(record.id(), record.revision())?;
        state.completion_sessions.remove(&removed.id());
        if let Some(key) = removed.idempotency_key() {
            state.idempotency.remove(&(removed.user_id(), key));
        }

        let account = state
            .accounts
            .get_mut(&removed.user_id())
            .ok_or(StorageError::NotFound)?;
        let account_before = account.snapshot();
        account.apply(debit, at);

        Ok(LedgerWrite {
            completion: removed,
            account_before,
            account_after: account.clone(),
        })
    }

    async fn ledger_snapshot(&self, user_id: UserId) -> Result<LedgerSnapshot, StorageError> {
        let guard = self.lock()?;
        let account = guard
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        let mut completions: Vec<CompletionRecord> = guard
            .ledgers
            .values()
            .flat_map(CompletionLedger::records)
            .filter(|r| r.is_owned_by(user_id))
            .cloned()
            .collect();
        completions.sort_by_key(|r| (r.completed_at(), r.id()));
        Ok(LedgerSnapshot {
            account,
            completions,
        })
    }

    async fn overwrite_totals(
        &self,
        user_id: UserId,
        expected_version: u64,
        totals: &AccountSnapshot,
        at: DateTime<Utc>,
    ) -> Result<ProgressionAccount, StorageError> {
        let mut guard = self.lock()?;
        let account = guard
            .accounts
            .get_mut(&user_id)
            .ok_or(StorageError::NotFound)?;
        if account.version() != expected_version {
            return Err(StorageError::Conflict);
        }
        account.restore(totals, at);
        Ok(account.clone())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub accounts: Arc<dyn AccountRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub completions: Arc<dyn CompletionRepository>,
    pub ledger: Arc<dyn LedgerPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let accounts: Arc<dyn AccountRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let completions: Arc<dyn CompletionRepository> = Arc::new(repo.clone());
        let ledger: Arc<dyn LedgerPersistence> = Arc::new(repo);
        Self {
            accounts,
            sessions,
            completions,
            ledger,
        }
    }
}
