//! Pure progression rules: what a completion is worth, and what level that buys.

pub mod delta;
pub mod level;
pub mod replay;
pub mod report;

pub use delta::{CompletionDelta, XP_PER_COMPLETED_SET};
pub use level::{LevelChange, XP_PER_LEVEL_STEP, level_for_xp};
pub use replay::{DriftReport, replay_ledger};
pub use report::{CreateReport, DeleteReport, UpdateReport};
