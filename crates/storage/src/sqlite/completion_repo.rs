use chrono::{DateTime, Utc};
use training_core::model::{
    CompletionId, CompletionLedger, CompletionRecord, IdempotencyKey, SessionId, UserId,
};

use super::SqliteRepository;
use super::mapping::{COMPLETION_COLUMNS, conn, map_completion_row, ser, u64_to_i64};
use crate::repository::{CompletionRepository, StorageError};

#[async_trait::async_trait]
impl CompletionRepository for SqliteRepository {
    async fn get_completion(
        &self,
        id: CompletionId,
    ) -> Result<Option<CompletionRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM completions WHERE id = ?1"
        ))
        .bind(u64_to_i64("completion_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_completion_row).transpose()
    }

    async fn session_ledger(
        &self,
        session_id: SessionId,
    ) -> Result<CompletionLedger, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {COMPLETION_COLUMNS} FROM completions
            WHERE session_id = ?1
            ORDER BY completed_at ASC, id ASC
            "
        ))
        .bind(u64_to_i64("session_id", session_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let records = rows
            .iter()
            .map(map_completion_row)
            .collect::<Result<Vec<_>, _>>()?;
        CompletionLedger::from_records(session_id, records).map_err(ser)
    }

    async fn completions_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {COMPLETION_COLUMNS} FROM completions
            WHERE user_id = ?1 AND completed_at >= ?2 AND completed_at < ?3
            ORDER BY completed_at ASC, id ASC
            "
        ))
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_completion_row).collect()
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: IdempotencyKey,
    ) -> Result<Option<CompletionRecord>, StorageError> {
        let row = sqlx::query(&format!(
            r"
            SELECT {COMPLETION_COLUMNS} FROM completions
            WHERE user_id = ?1 AND idempotency_key = ?2
            "
        ))
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_completion_row).transpose()
    }
}
