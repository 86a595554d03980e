pub mod account;
pub mod completion;
pub mod content;
mod ids;
pub mod ledger;
pub mod session;

pub use account::{AccountDelta, AccountSnapshot, AccountStats, ProgressionAccount};
pub use completion::{CompletionRecord, NewCompletion};
pub use content::{
    CompletionContent, CompletionDraft, ContentValidationError, Exercise, ExerciseDraft, SetDraft,
    SetEntry, Weight,
};
pub use ids::{CompletionId, IdempotencyKey, ParseIdError, SessionId, UserId};
pub use ledger::{CompletionLedger, LedgerError};
pub use session::{NewSession, Session, SessionDraft, SessionError};
