use serde::Serialize;

use crate::model::account::{AccountDelta, to_signed};
use crate::model::content::{CompletionContent, Weight};

/// XP awarded for every set marked completed.
pub const XP_PER_COMPLETED_SET: u64 = 10;

/// A completion's contribution to the account aggregates.
///
/// Deterministic in the content alone, which is what makes the
/// update-by-diff protocol sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDelta {
    pub xp: u64,
    pub weight: Weight,
    /// Minutes, taken from `actual_duration` rather than summed from sets.
    pub duration: u64,
}

impl CompletionDelta {
    #[must_use]
    pub fn of(content: &CompletionContent) -> Self {
        let mut completed_sets = 0_u64;
        let mut weight = Weight::ZERO;

        for set in content.sets().filter(|s| s.completed()) {
            completed_sets += 1;
            if set.reps() > 0 && !set.weight().is_zero() {
                weight = weight.saturating_add(set.weight().saturating_mul(u64::from(set.reps())));
            }
        }

        Self {
            xp: completed_sets.saturating_mul(XP_PER_COMPLETED_SET),
            weight,
            duration: u64::from(content.actual_duration()),
        }
    }

    /// Delta for a newly recorded completion (also counts the session).
    #[must_use]
    pub fn credit(&self) -> AccountDelta {
        AccountDelta {
            xp: to_signed(self.xp),
            workout_time: to_signed(self.duration),
            weight_millis: to_signed(self.weight.millis()),
            sessions: 1,
        }
    }

    /// Delta that reverses [`CompletionDelta::credit`].
    #[must_use]
    pub fn debit(&self) -> AccountDelta {
        AccountDelta {
            xp: -to_signed(self.xp),
            workout_time: -to_signed(self.duration),
            weight_millis: -to_signed(self.weight.millis()),
            sessions: -1,
        }
    }

    /// `self - previous`, for replacing a completion's content. The session
    /// count is untouched.
    #[must_use]
    pub fn diff_from(&self, previous: &CompletionDelta) -> AccountDelta {
        AccountDelta {
            xp: to_signed(self.xp) - to_signed(previous.xp),
            workout_time: to_signed(self.duration) - to_signed(previous.duration),
            weight_millis: to_signed(self.weight.millis()) - to_signed(previous.weight.millis()),
            sessions: 0,
        }
    }
}
