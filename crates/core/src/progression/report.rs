use serde::Serialize;

use crate::model::account::AccountDelta;
use crate::model::content::Weight;
use crate::progression::delta::CompletionDelta;
use crate::progression::level::LevelChange;

/// What a new completion did to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReport {
    pub xp_gained: u64,
    pub weight_gained: Weight,
    pub duration_applied: u64,
    pub level_up: bool,
    pub levels_gained: i64,
    pub old_level: u32,
    pub new_level: u32,
}

impl CreateReport {
    #[must_use]
    pub fn new(delta: &CompletionDelta, change: LevelChange) -> Self {
        Self {
            xp_gained: delta.xp,
            weight_gained: delta.weight,
            duration_applied: delta.duration,
            level_up: change.level_up(),
            levels_gained: change.levels_gained(),
            old_level: change.old_level,
            new_level: change.new_level,
        }
    }

    /// Report for a retried submission that applied nothing.
    #[must_use]
    pub fn unchanged(level: u32) -> Self {
        Self::new(&CompletionDelta::default(), LevelChange::new(level, level))
    }
}

/// Net change produced by correcting a completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub xp_diff: i64,
    pub weight_diff: f64,
    pub duration_diff: i64,
}

impl From<&AccountDelta> for UpdateReport {
    fn from(diff: &AccountDelta) -> Self {
        Self {
            xp_diff: diff.xp,
            weight_diff: diff.weight(),
            duration_diff: diff.workout_time,
        }
    }
}

/// Contribution withdrawn by deleting a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub xp_removed: u64,
    pub weight_removed: Weight,
    pub duration_removed: u64,
}

impl From<&CompletionDelta> for DeleteReport {
    fn from(delta: &CompletionDelta) -> Self {
        Self {
            xp_removed: delta.xp,
            weight_removed: delta.weight,
            duration_removed: delta.duration,
        }
    }
}
