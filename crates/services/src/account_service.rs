use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use storage::repository::{AccountRepository, LedgerPersistence, StorageError};
use training_core::model::{AccountSnapshot, ProgressionAccount, UserId};
use training_core::progression::DriftReport;

use crate::Clock;
use crate::error::{Resource, ServiceError};

/// What a repair pass found and, if needed, wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub drift: DriftReport,
    pub account: AccountSnapshot,
    pub repaired: bool,
}

/// Registration, snapshots, and ledger reconciliation for progression accounts.
#[derive(Clone)]
pub struct AccountService {
    clock: Clock,
    accounts: Arc<dyn AccountRepository>,
    ledger: Arc<dyn LedgerPersistence>,
}

impl AccountService {
    #[must_use]
    pub fn new(
        clock: Clock,
        accounts: Arc<dyn AccountRepository>,
        ledger: Arc<dyn LedgerPersistence>,
    ) -> Self {
        Self {
            clock,
            accounts,
            ledger,
        }
    }

    /// Create an account with zero aggregates at level one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AlreadyRegistered` if the user already has one.
    pub async fn register(&self, user_id: UserId) -> Result<ProgressionAccount, ServiceError> {
        let account = ProgressionAccount::new(user_id, self.clock.now());
        match self.accounts.create_account(&account).await {
            Ok(()) => {
                info!(%user_id, "account registered");
                Ok(account)
            }
            Err(StorageError::Conflict) => Err(ServiceError::AlreadyRegistered(user_id)),
            Err(err) => Err(ServiceError::storage(Resource::Account(user_id))(err)),
        }
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user has no account.
    pub async fn snapshot(&self, user_id: UserId) -> Result<AccountSnapshot, ServiceError> {
        let account = self
            .accounts
            .get_account(user_id)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?
            .ok_or(ServiceError::NotFound(Resource::Account(user_id)))?;
        debug!(%user_id, xp = account.xp(), level = account.level(), "account read");
        Ok(account.snapshot())
    }

    /// Compare stored aggregates with a replay of every completion the user owns.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user has no account.
    pub async fn reconcile(&self, user_id: UserId) -> Result<DriftReport, ServiceError> {
        Ok(self.inspect(user_id).await?.0)
    }

    /// Reconcile and, if the account drifted, overwrite it with the replayed totals.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user has no account, or
    /// `ServiceError::Conflict` if the account changed between read and write.
    pub async fn repair(&self, user_id: UserId) -> Result<RepairOutcome, ServiceError> {
        let (drift, account) = self.inspect(user_id).await?;
        if drift.is_consistent() {
            return Ok(RepairOutcome {
                account: account.snapshot(),
                drift,
                repaired: false,
            });
        }

        let repaired = self
            .ledger
            .overwrite_totals(user_id, account.version(), &drift.expected, self.clock.now())
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?;

        info!(
            %user_id,
            xp = repaired.xp(),
            sessions = repaired.total_sessions_completed(),
            "account repaired from ledger"
        );
        Ok(RepairOutcome {
            account: repaired.snapshot(),
            drift,
            repaired: true,
        })
    }

    async fn inspect(
        &self,
        user_id: UserId,
    ) -> Result<(DriftReport, ProgressionAccount), ServiceError> {
        let snapshot = self
            .ledger
            .ledger_snapshot(user_id)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?;

        let drift = DriftReport::compare(&snapshot.account, &snapshot.completions);
        if drift.is_consistent() {
            debug!(%user_id, records = drift.records_replayed, "account consistent with ledger");
        } else {
            warn!(
                %user_id,
                xp_drift = drift.drift.xp,
                sessions_drift = drift.drift.sessions,
                time_drift = drift.drift.workout_time,
                weight_drift = drift.drift.weight(),
                "account drifted from ledger"
            );
        }
        Ok((drift, snapshot.account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use storage::repository::Storage;
    use training_core::time::fixed_now;

    fn service(storage: &Storage) -> AccountService {
        AccountService::new(
            Clock::fixed(fixed_now()),
            Arc::clone(&storage.accounts),
            Arc::clone(&storage.ledger),
        )
    }

    #[tokio::test]
    async fn register_once() {
        let storage = Storage::in_memory();
        let service = service(&storage);
        let account = service.register(UserId::new(1)).await.unwrap();
        assert_eq!(account.level(), 1);
        assert!(matches!(
            service.register(UserId::new(1)).await.unwrap_err(),
            ServiceError::AlreadyRegistered(_)
        ));
        assert_eq!(
            service.snapshot(UserId::new(1)).await.unwrap(),
            AccountSnapshot::default()
        );
    }

    #[tokio::test]
    async fn fresh_account_needs_no_repair() {
        let storage = Storage::in_memory();
        let service = service(&storage);
        service.register(UserId::new(1)).await.unwrap();

        let outcome = service.repair(UserId::new(1)).await.unwrap();
        assert!(!outcome.repaired);
        assert!(outcome.drift.is_consistent());
        assert!(matches!(
            service.reconcile(UserId::new(2)).await.unwrap_err(),
            ServiceError::NotFound(Resource::Account(_))
        ));
    }
}
