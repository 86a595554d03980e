use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::content::Weight;
use crate::model::ids::UserId;
use crate::progression::level::{LevelChange, level_for_xp};

//
// ─── DELTA ────────────────────────────────────────────────────────────────────
//

/// Signed change to apply to an account's aggregates.
///
/// Negative components are clamped at zero when applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDelta {
    pub xp: i64,
    pub workout_time: i64,
    pub weight_millis: i64,
    pub sessions: i64,
}

impl AccountDelta {
    /// Difference `to - from`, component by component.
    #[must_use]
    pub fn between(from: &AccountSnapshot, to: &AccountSnapshot) -> Self {
        Self {
            xp: signed_diff(to.xp, from.xp),
            workout_time: signed_diff(to.stats.total_workout_time, from.stats.total_workout_time),
            weight_millis: signed_diff(
                to.stats.total_weight_lifted.millis(),
                from.stats.total_weight_lifted.millis(),
            ),
            sessions: signed_diff(to.total_sessions_completed, from.total_sessions_completed),
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Weight component in whole units.
    #[must_use]
    pub fn weight(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let millis = self.weight_millis as f64;
        millis / 1_000.0
    }
}

pub(crate) fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn signed_diff(to: u64, from: u64) -> i64 {
    to_signed(to).saturating_sub(to_signed(from))
}

/// Ceiling for every aggregate, so totals always fit a signed 64-bit column.
pub const MAX_TOTAL: u64 = i64::MAX.unsigned_abs();

/// `max(0, current + delta)`, capped at [`MAX_TOTAL`].
fn apply_clamped(current: u64, delta: i64) -> u64 {
    if delta >= 0 {
        current.saturating_add(delta.unsigned_abs()).min(MAX_TOTAL)
    } else {
        current.saturating_sub(delta.unsigned_abs())
    }
}

//
// ─── SNAPSHOT ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    /// Minutes.
    pub total_workout_time: u64,
    pub total_weight_lifted: Weight,
}

/// Externally visible aggregate state of a progression account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub xp: u64,
    pub level: u32,
    pub total_sessions_completed: u64,
    pub stats: AccountStats,
}

impl Default for AccountSnapshot {
    fn default() -> Self {
        Self {
            xp: 0,
            level: level_for_xp(0),
            total_sessions_completed: 0,
            stats: AccountStats::default(),
        }
    }
}

impl AccountSnapshot {
    /// Returns a copy with every aggregate moved by `delta` (clamped at zero)
    /// and the level re-derived from the resulting xp.
    #[must_use]
    pub fn with_delta(&self, delta: &AccountDelta) -> Self {
        let xp = apply_clamped(self.xp, delta.xp);
        Self {
            xp,
            level: level_for_xp(xp),
            total_sessions_completed: apply_clamped(self.total_sessions_completed, delta.sessions),
            stats: AccountStats {
                total_workout_time: apply_clamped(
                    self.stats.total_workout_time,
                    delta.workout_time,
                ),
                total_weight_lifted: Weight::from_millis(apply_clamped(
                    self.stats.total_weight_lifted.millis(),
                    delta.weight_millis,
                )),
            },
        }
    }
}

//
// ─── ACCOUNT ──────────────────────────────────────────────────────────────────
//

/// Per-user aggregate state.
///
/// `level` is never stored independently: it is always derived from `xp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionAccount {
    user_id: UserId,
    totals: AccountSnapshot,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgressionAccount {
    /// A freshly registered account: zero everywhere, level one.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            totals: AccountSnapshot::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate from storage. The level is recomputed from `xp`.
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        xp: u64,
        total_sessions_completed: u64,
        stats: AccountStats,
        version: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            totals: AccountSnapshot {
                xp,
                level: level_for_xp(xp),
                total_sessions_completed,
                stats,
            },
            version,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn xp(&self) -> u64 {
        self.totals.xp
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.totals.level
    }

    #[must_use]
    pub fn total_sessions_completed(&self) -> u64 {
        self.totals.total_sessions_completed
    }

    #[must_use]
    pub fn stats(&self) -> AccountStats {
        self.totals.stats
    }

    /// Monotonic counter bumped on every write; used for optimistic checks.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn snapshot(&self) -> AccountSnapshot {
        self.totals
    }

    /// Apply a delta and recompute the level.
    pub fn apply(&mut self, delta: &AccountDelta, now: DateTime<Utc>) -> LevelChange {
        let old_level = self.totals.level;
        self.totals = self.totals.with_delta(delta);
        self.touch(now);
        LevelChange::new(old_level, self.totals.level)
    }

    /// Replace all aggregates, e.g. with the result of a ledger replay.
    pub fn restore(&mut self, totals: &AccountSnapshot, now: DateTime<Utc>) -> LevelChange {
        let old_level = self.totals.level;
        self.totals = AccountSnapshot {
            level: level_for_xp(totals.xp),
            ..*totals
        };
        self.touch(now);
        LevelChange::new(old_level, self.totals.level)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version = self.version.saturating_add(1);
        self.updated_at = now;
    }
}
