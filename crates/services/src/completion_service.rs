use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use storage::repository::{
    AccountRepository, CompletionRepository, LedgerPersistence, LedgerWrite, SessionRepository,
    StorageError,
};
use training_core::model::{
    AccountSnapshot, CompletionDraft, CompletionId, CompletionLedger, CompletionRecord,
    IdempotencyKey, NewCompletion, SessionId, UserId,
};
use training_core::progression::{
    CompletionDelta, CreateReport, DeleteReport, LevelChange, UpdateReport,
};

use crate::Clock;
use crate::error::{Resource, ServiceError};
use crate::session_service::owned_session;

/// Result of a ledger mutation: the record, the account afterwards, and what changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome<R> {
    pub completion: CompletionRecord,
    pub account: AccountSnapshot,
    pub report: R,
    /// Set when a retried submission matched an earlier one and nothing was applied.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

impl<R> CompletionOutcome<R> {
    fn applied(write: LedgerWrite, report: R) -> Self {
        Self {
            completion: write.completion,
            account: write.account_after.snapshot(),
            report,
            replayed: false,
        }
    }
}

/// Creates, corrects, and removes completions while keeping the owner's
/// account equal to the sum of its ledger.
#[derive(Clone)]
pub struct CompletionService {
    clock: Clock,
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionRepository>,
    completions: Arc<dyn CompletionRepository>,
    ledger: Arc<dyn LedgerPersistence>,
}

impl CompletionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
        completions: Arc<dyn CompletionRepository>,
        ledger: Arc<dyn LedgerPersistence>,
    ) -> Self {
        Self {
            clock,
            accounts,
            sessions,
            completions,
            ledger,
        }
    }

    /// Record a finished session and credit the account.
    ///
    /// With an `idempotency_key` that was already used for the same session, the
    /// original record is returned with `replayed = true` and nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for malformed content (nothing is written),
    /// `ServiceError::NotFound` if the account or an active owned session is missing,
    /// `ServiceError::Conflict` if the key was used for a different session,
    /// `ServiceError::Storage` on persistence failures.
    pub async fn create(
        &self,
        user_id: UserId,
        session_id: SessionId,
        draft: CompletionDraft,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<CompletionOutcome<CreateReport>, ServiceError> {
        let content = draft.validate()?;

        if let Some(key) = idempotency_key {
            if let Some(outcome) = self.replay(user_id, session_id, key).await? {
                return Ok(outcome);
            }
        }

        self.accounts
            .get_account(user_id)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?
            .ok_or(ServiceError::NotFound(Resource::Account(user_id)))?;
        let session = owned_session(self.sessions.as_ref(), user_id, session_id).await?;
        if session.is_deleted() {
            return Err(ServiceError::NotFound(Resource::Session(session_id)));
        }

        let now = self.clock.now();
        let delta = CompletionDelta::of(&content);
        let new = NewCompletion::new(user_id, session_id, now, content, idempotency_key);

        let write = match self.ledger.append_completion(new, &delta.credit(), now).await {
            Ok(write) => write,
            Err(StorageError::Conflict) => {
                let Some(key) = idempotency_key else {
                    return Err(ServiceError::Conflict(Resource::Session(session_id)));
                };
                // Lost a race against a retry carrying the same key.
                return self
                    .replay(user_id, session_id, key)
                    .await?
                    .ok_or(ServiceError::Conflict(Resource::IdempotencyKey(key)));
            }
            Err(err) => return Err(ServiceError::storage(Resource::Session(session_id))(err)),
        };

        let change = LevelChange::new(write.account_before.level, write.account_after.level());
        let report = CreateReport::new(&delta, change);
        info!(
            %user_id,
            %session_id,
            completion_id = %write.completion.id(),
            xp = delta.xp,
            weight = delta.weight.as_f64(),
            duration = delta.duration,
            level = write.account_after.level(),
            level_up = change.level_up(),
            "completion recorded"
        );
        Ok(CompletionOutcome::applied(write, report))
    }

    async fn replay(
        &self,
        user_id: UserId,
        session_id: SessionId,
        key: IdempotencyKey,
    ) -> Result<Option<CompletionOutcome<CreateReport>>, ServiceError> {
        let Some(record) = self
            .completions
            .find_by_idempotency_key(user_id, key)
            .await
            .map_err(ServiceError::storage(Resource::IdempotencyKey(key)))?
        else {
            return Ok(None);
        };

        if record.session_id() != session_id {
            warn!(
                %user_id,
                %key,
                used_for = %record.session_id(),
                %session_id,
                "idempotency key reused for another session"
            );
            return Err(ServiceError::Conflict(Resource::IdempotencyKey(key)));
        }

        let account = self
            .accounts
            .get_account(user_id)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?
            .ok_or(ServiceError::NotFound(Resource::Account(user_id)))?;

        info!(%user_id, %session_id, completion_id = %record.id(), %key, "completion replayed");
        Ok(Some(CompletionOutcome {
            report: CreateReport::unchanged(account.level()),
            completion: record,
            account: account.snapshot(),
            replayed: true,
        }))
    }

    /// Replace a completion's content and apply `delta(new) - delta(old)`.
    ///
    /// Submitting the same content twice applies the difference only once.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for malformed content,
    /// `ServiceError::NotFound` if the completion is missing or not owned,
    /// `ServiceError::Conflict` if a concurrent edit or delete won,
    /// `ServiceError::Storage` on persistence failures.
    pub async fn update(
        &self,
        user_id: UserId,
        completion_id: CompletionId,
        draft: CompletionDraft,
    ) -> Result<CompletionOutcome<UpdateReport>, ServiceError> {
        let content = draft.validate()?;
        let stored = self.owned_completion(user_id, completion_id).await?;

        let now = self.clock.now();
        let previous = stored.delta();
        let revised = stored.revised(content, now);
        let diff = revised.delta().diff_from(&previous);

        let write = self
            .ledger
            .replace_completion(&revised, stored.revision(), &diff, now)
            .await
            .map_err(|err| write_failed(user_id, completion_id, err))?;

        info!(
            %user_id,
            session_id = %revised.session_id(),
            %completion_id,
            revision = revised.revision(),
            xp_diff = diff.xp,
            weight_diff = diff.weight(),
            duration_diff = diff.workout_time,
            "completion corrected"
        );
        Ok(CompletionOutcome::applied(write, UpdateReport::from(&diff)))
    }

    /// Permanently remove a completion and withdraw its contribution.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the completion is missing or not owned,
    /// `ServiceError::Conflict` if it was corrected meanwhile,
    /// `ServiceError::Storage` on persistence failures.
    pub async fn delete(
        &self,
        user_id: UserId,
        completion_id: CompletionId,
    ) -> Result<CompletionOutcome<DeleteReport>, ServiceError> {
        let stored = self.owned_completion(user_id, completion_id).await?;

        let now = self.clock.now();
        let delta = stored.delta();
        let write = self
            .ledger
            .remove_completion(&stored, &delta.debit(), now)
            .await
            .map_err(|err| write_failed(user_id, completion_id, err))?;

        info!(
            %user_id,
            session_id = %stored.session_id(),
            %completion_id,
            xp_removed = delta.xp,
            weight_removed = delta.weight.as_f64(),
            duration_removed = delta.duration,
            "completion deleted"
        );
        Ok(CompletionOutcome::applied(write, DeleteReport::from(&delta)))
    }

    /// Fetch one completion of the acting user.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if it is missing or owned by someone else.
    pub async fn get_completion(
        &self,
        user_id: UserId,
        completion_id: CompletionId,
    ) -> Result<CompletionRecord, ServiceError> {
        self.owned_completion(user_id, completion_id).await
    }

    /// Full history of a session, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session is missing or not owned.
    pub async fn session_ledger(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<CompletionLedger, ServiceError> {
        let session = owned_session(self.sessions.as_ref(), user_id, session_id).await?;

        let ledger = self
            .completions
            .session_ledger(session.id())
            .await
            .map_err(ServiceError::storage(Resource::Session(session_id)))?;
        debug!(%user_id, %session_id, records = ledger.len(), "session ledger read");
        Ok(ledger)
    }

    /// Completions of the acting user with `from <= completed_at < until`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` on persistence failures.
    pub async fn calendar(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, ServiceError> {
        if from >= until {
            return Ok(Vec::new());
        }
        let records = self
            .completions
            .completions_between(user_id, from, until)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?;
        debug!(%user_id, %from, %until, records = records.len(), "calendar read");
        Ok(records)
    }

    async fn owned_completion(
        &self,
        user_id: UserId,
        completion_id: CompletionId,
    ) -> Result<CompletionRecord, ServiceError> {
        let record = self
            .completions
            .get_completion(completion_id)
            .await
            .map_err(ServiceError::storage(Resource::Completion(completion_id)))?
            .ok_or(ServiceError::NotFound(Resource::Completion(completion_id)))?;

        if !record.is_owned_by(user_id) {
            warn!(
                %user_id,
                %completion_id,
                owner = %record.user_id(),
                "access to foreign completion"
            );
            return Err(ServiceError::NotFound(Resource::Completion(completion_id)));
        }
        Ok(record)
    }
}

fn write_failed(user_id: UserId, completion_id: CompletionId, err: StorageError) -> ServiceError {
    if matches!(err, StorageError::Conflict) {
        warn!(%user_id, %completion_id, "completion changed concurrently");
    }
    ServiceError::storage(Resource::Completion(completion_id))(err)
}
