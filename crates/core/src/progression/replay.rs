use serde::Serialize;

use crate::model::account::{AccountDelta, AccountSnapshot, ProgressionAccount};
use crate::model::completion::CompletionRecord;
use crate::model::UserId;
use crate::progression::delta::CompletionDelta;

/// Recompute what an account's aggregates should be from its full ledger.
///
/// Every record contributes its credit; nothing is clamped because no
/// intermediate total can go negative when only credits are applied.
pub fn replay_ledger<'a>(
    records: impl IntoIterator<Item = &'a CompletionRecord>,
) -> AccountSnapshot {
    records
        .into_iter()
        .fold(AccountSnapshot::default(), |totals, record| {
            totals.with_delta(&CompletionDelta::of(record.content()).credit())
        })
}

/// Stored aggregates compared against a ledger replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub user_id: UserId,
    pub records_replayed: usize,
    pub stored: AccountSnapshot,
    pub expected: AccountSnapshot,
    /// `expected - stored`; zero when the account is consistent.
    pub drift: AccountDelta,
}

impl DriftReport {
    #[must_use]
    pub fn compare(account: &ProgressionAccount, records: &[CompletionRecord]) -> Self {
        let stored = account.snapshot();
        let expected = replay_ledger(records);
        Self {
            user_id: account.user_id(),
            records_replayed: records.len(),
            stored,
            expected,
            drift: AccountDelta::between(&stored, &expected),
        }
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.stored == self.expected
    }
}
