use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::content::CompletionContent;
use crate::model::ids::{CompletionId, IdempotencyKey, SessionId, UserId};
use crate::progression::delta::CompletionDelta;

/// A completion that has been validated but not yet assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompletion {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub completed_at: DateTime<Utc>,
    pub content: CompletionContent,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl NewCompletion {
    #[must_use]
    pub fn new(
        user_id: UserId,
        session_id: SessionId,
        completed_at: DateTime<Utc>,
        content: CompletionContent,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Self {
        Self {
            user_id,
            session_id,
            completed_at,
            content,
            idempotency_key,
        }
    }

    #[must_use]
    pub fn into_record(self, id: CompletionId) -> CompletionRecord {
        CompletionRecord {
            id,
            user_id: self.user_id,
            session_id: self.session_id,
            completed_at: self.completed_at,
            content: self.content,
            revision: 0,
            idempotency_key: self.idempotency_key,
            updated_at: None,
        }
    }
}

/// One historical performance of a session.
///
/// Identity, owner, session, and `completed_at` never change. The content can
/// be corrected; every correction bumps `revision`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    id: CompletionId,
    user_id: UserId,
    session_id: SessionId,
    completed_at: DateTime<Utc>,
    #[serde(flatten)]
    content: CompletionContent,
    revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotency_key: Option<IdempotencyKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl CompletionRecord {
    /// Rehydrate a completion from persisted storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: CompletionId,
        user_id: UserId,
        session_id: SessionId,
        completed_at: DateTime<Utc>,
        content: CompletionContent,
        revision: u64,
        idempotency_key: Option<IdempotencyKey>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            session_id,
            completed_at,
            content,
            revision,
            idempotency_key,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> CompletionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn content(&self) -> &CompletionContent {
        &self.content
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.idempotency_key
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// This record's current contribution to its owner's account.
    #[must_use]
    pub fn delta(&self) -> CompletionDelta {
        CompletionDelta::of(&self.content)
    }

    /// A copy carrying corrected content and the next revision.
    #[must_use]
    pub fn revised(&self, content: CompletionContent, now: DateTime<Utc>) -> Self {
        Self {
            content,
            revision: self.revision.saturating_add(1),
            updated_at: Some(now),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::{CompletionDraft, ExerciseDraft, SetDraft};
    use crate::time::fixed_now;

    fn content(sets: usize) -> CompletionContent {
        CompletionDraft::new(
            30,
            "",
            vec![ExerciseDraft::new(
                "Squat",
                "legs",
                vec![SetDraft::strength(5, 100.0, true); sets],
            )],
        )
        .validate()
        .unwrap()
    }

    #[test]
    fn revised_keeps_identity_and_bumps_revision() {
        let now = fixed_now();
        let record = NewCompletion::new(UserId::new(1), SessionId::new(2), now, content(1), None)
            .into_record(CompletionId::new(3));
        let later = now + chrono::Duration::hours(1);
        let revised = record.revised(content(4), later);

        assert_eq!(revised.id(), record.id());
        assert_eq!(revised.completed_at(), now);
        assert_eq!(revised.revision(), 1);
        assert_eq!(revised.updated_at(), Some(later));
        assert_eq!(revised.delta().xp, 40);
        assert_eq!(record.delta().xp, 10);
    }

    #[test]
    fn serializes_content_inline() {
        let record =
            NewCompletion::new(UserId::new(1), SessionId::new(2), fixed_now(), content(1), None)
                .into_record(CompletionId::new(3));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sessionId"], 2);
        assert_eq!(json["actualDuration"], 30);
        assert_eq!(json["exercises"][0]["sets"][0]["reps"], 5);
        assert!(json.get("idempotencyKey").is_none());
    }
}
