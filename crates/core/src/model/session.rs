use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::content::{ContentValidationError, Exercise, ExerciseDraft};
use crate::model::ids::{SessionId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session name cannot be empty")]
    EmptyName,

    #[error("session {0} has been deleted")]
    Deleted(SessionId),

    #[error(transparent)]
    InvalidPlan(#[from] ContentValidationError),
}

/// Suffix appended to the name of a duplicated session.
const COPY_SUFFIX: &str = " (copy)";

/// User-editable part of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDraft {
    pub name: String,
    pub description: Option<String>,
    pub plan: Vec<ExerciseDraft>,
}

impl SessionDraft {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn validate(self) -> Result<(String, Option<String>, Vec<Exercise>), SessionError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        let description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());
        let plan = self
            .plan
            .into_iter()
            .enumerate()
            .map(|(index, draft)| draft.validate(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((name, description, plan))
    }
}

/// A validated session that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub plan: Vec<Exercise>,
    pub created_at: DateTime<Utc>,
}

impl NewSession {
    /// Validate a draft for the given owner.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyName` or `SessionError::InvalidPlan`.
    pub fn from_draft(
        user_id: UserId,
        draft: SessionDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let (name, description, plan) = draft.validate()?;
        Ok(Self {
            user_id,
            name,
            description,
            plan,
            created_at: now,
        })
    }

    #[must_use]
    pub fn into_session(self, id: SessionId) -> Session {
        Session {
            id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            plan: self.plan,
            created_at: self.created_at,
            updated_at: self.created_at,
            deleted_at: None,
        }
    }
}

/// A workout template owned by one user.
///
/// Its completion history lives in a [`CompletionLedger`](crate::model::CompletionLedger)
/// that outlives the session's visibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    name: String,
    description: Option<String>,
    plan: Vec<Exercise>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Rehydrate a session from persisted storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        name: String,
        description: Option<String>,
        plan: Vec<Exercise>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            name,
            description,
            plan,
            created_at,
            updated_at,
            deleted_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn plan(&self) -> &[Exercise] {
        &self.plan
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
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Replace name, description, and plan of an active session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Deleted` for a soft-deleted session, or a
    /// validation error for the draft.
    pub fn edit(&mut self, draft: SessionDraft, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.is_deleted() {
            return Err(SessionError::Deleted(self.id));
        }
        let (name, description, plan) = draft.validate()?;
        self.name = name;
        self.description = description;
        self.plan = plan;
        self.updated_at = now;
        Ok(())
    }

    /// Hide the session from listings. Its ledger is left untouched.
    ///
    /// Returns `false` if it was already deleted.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.deleted_at = Some(now);
        self.updated_at = now;
        true
    }

    /// A fresh, active shell with the same plan and no history.
    #[must_use]
    pub fn duplicate(&self, now: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id: self.user_id,
            name: format!("{}{COPY_SUFFIX}", self.name),
            description: self.description.clone(),
            plan: self.plan.clone(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::SetDraft;
    use crate::time::fixed_now;

    fn session() -> Session {
        let draft = SessionDraft {
            name: "  Push day ".into(),
            description: Some("   ".into()),
            plan: vec![ExerciseDraft::new(
                "Bench",
                "push",
                vec![SetDraft::strength(5, 80.0, false)],
            )],
        };
        NewSession::from_draft(UserId::new(1), draft, fixed_now())
            .unwrap()
            .into_session(SessionId::new(10))
    }

    #[test]
    fn draft_is_trimmed() {
        let s = session();
        assert_eq!(s.name(), "Push day");
        assert_eq!(s.description(), None);
        assert_eq!(s.plan().len(), 1);
        assert!(!s.is_deleted());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = NewSession::from_draft(UserId::new(1), SessionDraft::named(" "), fixed_now())
            .unwrap_err();
        assert_eq!(err, SessionError::EmptyName);
    }

    #[test]
    fn deleted_session_cannot_be_edited() {
        let mut s = session();
        assert!(s.soft_delete(fixed_now()));
        assert!(!s.soft_delete(fixed_now()));
        let err = s.edit(SessionDraft::named("Pull day"), fixed_now()).unwrap_err();
        assert_eq!(err, SessionError::Deleted(SessionId::new(10)));
    }

    #[test]
    fn duplicate_copies_plan_not_state() {
        let mut s = session();
        s.soft_delete(fixed_now());
        let later = fixed_now() + chrono::Duration::days(1);
        let copy = s.duplicate(later).into_session(SessionId::new(11));
        assert_eq!(copy.name(), "Push day (copy)");
        assert_eq!(copy.plan(), s.plan());
        assert!(!copy.is_deleted());
        assert_eq!(copy.created_at(), later);
    }
}
