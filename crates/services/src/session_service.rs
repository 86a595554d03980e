use std::sync::Arc;

use tracing::{debug, info, warn};

use storage::repository::{AccountRepository, SessionRepository};
use training_core::model::{NewSession, Session, SessionDraft, SessionId, UserId};

use crate::Clock;
use crate::error::{Resource, ServiceError};

/// Fetch a session the acting user owns, deleted or not.
pub(crate) async fn owned_session(
    sessions: &dyn SessionRepository,
    user_id: UserId,
    session_id: SessionId,
) -> Result<Session, ServiceError> {
    let session = sessions
        .get_session(session_id)
        .await
        .map_err(ServiceError::storage(Resource::Session(session_id)))?
        .ok_or(ServiceError::NotFound(Resource::Session(session_id)))?;

    if !session.is_owned_by(user_id) {
        warn!(%user_id, %session_id, owner = %session.user_id(), "access to foreign session");
        return Err(ServiceError::NotFound(Resource::Session(session_id)));
    }
    Ok(session)
}

/// Manages workout session templates. Never touches ledgers or accounts.
#[derive(Clone)]
pub struct SessionService {
    clock: Clock,
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            clock,
            accounts,
            sessions,
        }
    }

    /// Create an active session with an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidSession` or `ServiceError::Validation` for a bad
    /// draft, `ServiceError::NotFound` if the user has no account.
    pub async fn create(
        &self,
        user_id: UserId,
        draft: SessionDraft,
    ) -> Result<Session, ServiceError> {
        let new = NewSession::from_draft(user_id, draft, self.clock.now())?;
        self.accounts
            .get_account(user_id)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?
            .ok_or(ServiceError::NotFound(Resource::Account(user_id)))?;

        self.insert(new).await
    }

    /// Replace name, description, and plan of an active session.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session is missing, foreign, or
    /// soft-deleted, or a validation error for the draft.
    pub async fn edit(
        &self,
        user_id: UserId,
        session_id: SessionId,
        draft: SessionDraft,
    ) -> Result<Session, ServiceError> {
        let mut session = owned_session(self.sessions.as_ref(), user_id, session_id).await?;
        session.edit(draft, self.clock.now())?;
        self.save(&session).await?;

        info!(%user_id, %session_id, "session edited");
        Ok(session)
    }

    /// Hide a session from listings. Its completions and their contributions stay.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session is missing, foreign, or
    /// already deleted.
    pub async fn delete(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Session, ServiceError> {
        let mut session = owned_session(self.sessions.as_ref(), user_id, session_id).await?;
        if !session.soft_delete(self.clock.now()) {
            return Err(ServiceError::NotFound(Resource::Session(session_id)));
        }
        self.save(&session).await?;

        info!(%user_id, %session_id, "session soft-deleted");
        Ok(session)
    }

    /// Copy a session's plan into a new active session with no history.
    ///
    /// Soft-deleted sessions can be duplicated.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session is missing or foreign.
    pub async fn duplicate(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Session, ServiceError> {
        let source = owned_session(self.sessions.as_ref(), user_id, session_id).await?;
        let copy = self.insert(source.duplicate(self.clock.now())).await?;

        info!(%user_id, source = %session_id, copy = %copy.id(), "session duplicated");
        Ok(copy)
    }

    /// Fetch a session the user owns, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session is missing or foreign.
    pub async fn get(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Session, ServiceError> {
        owned_session(self.sessions.as_ref(), user_id, session_id).await
    }

    /// Active sessions of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn list_active(&self, user_id: UserId) -> Result<Vec<Session>, ServiceError> {
        let sessions = self
            .sessions
            .list_active_sessions(user_id)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?;
        debug!(%user_id, count = sessions.len(), "active sessions listed");
        Ok(sessions)
    }

    async fn insert(&self, new: NewSession) -> Result<Session, ServiceError> {
        let user_id = new.user_id;
        let session = self
            .sessions
            .insert_session(new)
            .await
            .map_err(ServiceError::storage(Resource::Account(user_id)))?;
        info!(%user_id, session_id = %session.id(), name = session.name(), "session created");
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<(), ServiceError> {
        self.sessions
            .save_session(session)
            .await
            .map_err(ServiceError::storage(Resource::Session(session.id())))
    }
}
