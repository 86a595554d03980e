use training_core::model::{NewSession, Session, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{
    SESSION_COLUMNS, conn, map_session_row, plan_to_json, u64_to_i64, write_error,
};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, session: NewSession) -> Result<Session, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO sessions (user_id, name, description, plan_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ",
        )
        .bind(u64_to_i64("user_id", session.user_id.value())?)
        .bind(&session.name)
        .bind(&session.description)
        .bind(plan_to_json(&session.plan)?)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("session id sign overflow".into()))?;
        Ok(session.into_session(SessionId::new(id)))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
        ))
        .bind(u64_to_i64("session_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE sessions
            SET name = ?2, description = ?3, plan_json = ?4, updated_at = ?5, deleted_at = ?6
            WHERE id = ?1 AND deleted_at IS NULL
            ",
        )
        .bind(u64_to_i64("session_id", session.id().value())?)
        .bind(session.name())
        .bind(session.description())
        .bind(plan_to_json(session.plan())?)
        .bind(session.updated_at())
        .bind(session.deleted_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE user_id = ?1 AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            "
        ))
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_session_row).collect()
    }
}
