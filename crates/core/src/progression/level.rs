use serde::Serialize;

/// XP scale of the level curve: level `n + 1` starts at `100 * n^2` xp.
pub const XP_PER_LEVEL_STEP: u64 = 100;

/// `floor(sqrt(xp / 100)) + 1`.
///
/// Computed with an integer square root so there is no float rounding at the
/// level boundaries (`100 * n^2 <= xp` exactly).
#[must_use]
pub fn level_for_xp(xp: u64) -> u32 {
    let steps = (xp / XP_PER_LEVEL_STEP).isqrt();
    u32::try_from(steps).map_or(u32::MAX, |s| s.saturating_add(1))
}

/// Level before and after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelChange {
    pub old_level: u32,
    pub new_level: u32,
}

impl LevelChange {
    #[must_use]
    pub fn new(old_level: u32, new_level: u32) -> Self {
        Self {
            old_level,
            new_level,
        }
    }

    #[must_use]
    pub fn level_up(&self) -> bool {
        self.new_level > self.old_level
    }

    /// Negative when levels were lost (after an edit or delete).
    #[must_use]
    pub fn levels_gained(&self) -> i64 {
        i64::from(self.new_level) - i64::from(self.old_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_xp_is_level_one() {
        assert_eq!(level_for_xp(0), 1);
    }

    #[test]
    fn boundaries_are_exact() {
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(399), 2);
        assert_eq!(level_for_xp(400), 3);
        assert_eq!(level_for_xp(900), 4);
        assert_eq!(level_for_xp(10_000), 11);
    }

    #[test]
    fn level_is_monotonic() {
        let mut previous = level_for_xp(0);
        for xp in (0..50_000).step_by(7) {
            let level = level_for_xp(xp);
            assert!(level >= previous, "level dropped at xp={xp}");
            previous = level;
        }
    }

    #[test]
    fn huge_xp_does_not_overflow() {
        assert!(level_for_xp(u64::MAX) > 1);
    }

    #[test]
    fn change_reports_direction() {
        let up = LevelChange::new(1, 3);
        assert!(up.level_up());
        assert_eq!(up.levels_gained(), 2);

        let down = LevelChange::new(2, 1);
        assert!(!down.level_up());
        assert_eq!(down.levels_gained(), -1);
    }
}
