use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use training_core::model::{
    AccountDelta, AccountSnapshot, CompletionId, CompletionRecord, NewCompletion,
    ProgressionAccount, UserId,
};

use super::SqliteRepository;
use super::mapping::{
    ACCOUNT_COLUMNS, COMPLETION_COLUMNS, conn, exercises_to_json, map_account_row,
    map_completion_row, u64_to_i64, write_error,
};
use crate::repository::{LedgerPersistence, LedgerSnapshot, LedgerWrite, StorageError};

// Every write transaction below starts with a write statement so the
// connection holds the database write lock before it reads anything.

async fn load_account(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: UserId,
) -> Result<ProgressionAccount, StorageError> {
    let row = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1"
    ))
    .bind(u64_to_i64("user_id", user_id.value())?)
    .fetch_optional(&mut **tx)
    .await
    .map_err(conn)?;

    row.as_ref()
        .map(map_account_row)
        .transpose()?
        .ok_or(StorageError::NotFound)
}

async fn store_totals(
    tx: &mut Transaction<'_, Sqlite>,
    account: &ProgressionAccount,
    expected_version: u64,
) -> Result<u64, StorageError> {
    let stats = account.stats();
    let res = sqlx::query(
        r"
        UPDATE accounts
        SET xp = ?2,
            total_sessions_completed = ?3,
            total_workout_time = ?4,
            total_weight_lifted = ?5,
            version = ?6,
            updated_at = ?7
        WHERE user_id = ?1 AND version = ?8
        ",
    )
    .bind(u64_to_i64("user_id", account.user_id().value())?)
    .bind(u64_to_i64("xp", account.xp())?)
    .bind(u64_to_i64(
        "total_sessions_completed",
        account.total_sessions_completed(),
    )?)
    .bind(u64_to_i64("total_workout_time", stats.total_workout_time)?)
    .bind(u64_to_i64(
        "total_weight_lifted",
        stats.total_weight_lifted.millis(),
    )?)
    .bind(u64_to_i64("version", account.version())?)
    .bind(account.updated_at())
    .bind(u64_to_i64("version", expected_version)?)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    Ok(res.rows_affected())
}

/// Apply `delta` to the owner's account inside `tx` as a storage-level
/// increment clamped at zero. The weight total is also capped at `i64::MAX`,
/// since `SQLite` turns an overflowing integer sum into a REAL.
/// Returns the totals before and the account after.
async fn apply_delta(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: UserId,
    delta: &AccountDelta,
    at: DateTime<Utc>,
) -> Result<(AccountSnapshot, ProgressionAccount), StorageError> {
    let before = load_account(tx, user_id).await?.snapshot();

    let res = sqlx::query(
        r"
        UPDATE accounts
        SET xp = MAX(0, xp + ?2),
            total_sessions_completed = MAX(0, total_sessions_completed + ?3),
            total_workout_time = MAX(0, total_workout_time + ?4),
            total_weight_lifted = CASE
                WHEN ?5 > 0 AND total_weight_lifted > ?7 - ?5 THEN ?7
                ELSE MAX(0, total_weight_lifted + ?5)
            END,
            version = version + 1,
            updated_at = ?6
        WHERE user_id = ?1
        ",
    )
    .bind(u64_to_i64("user_id", user_id.value())?)
    .bind(delta.xp)
    .bind(delta.sessions)
    .bind(delta.workout_time)
    .bind(delta.weight_millis)
    .bind(at)
    .bind(i64::MAX)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    if res.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }
    let after = load_account(tx, user_id).await?;
    Ok((before, after))
}

/// Distinguish "gone" from "revised meanwhile" after a guarded write hit no rows.
async fn missing_or_stale(
    tx: &mut Transaction<'_, Sqlite>,
    id: CompletionId,
    user_id: UserId,
) -> Result<StorageError, StorageError> {
    let row = sqlx::query("SELECT 1 FROM completions WHERE id = ?1 AND user_id = ?2")
        .bind(u64_to_i64("completion_id", id.value())?)
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_optional(&mut **tx)
        .await
        .map_err(conn)?;

    Ok(match row {
        Some(_) => StorageError::Conflict,
        None => StorageError::NotFound,
    })
}

#[async_trait::async_trait]
impl LedgerPersistence for SqliteRepository {
    async fn append_completion(
        &self,
        completion: NewCompletion,
        credit: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError> {
        let user_id = completion.user_id;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Only active sessions owned by the submitter accept completions.
        let res = sqlx::query(
            r"
            INSERT INTO completions (
                user_id, session_id, completed_at, actual_duration, notes,
                exercises_json, revision, idempotency_key, updated_at
            )
            SELECT ?1, s.id, ?3, ?4, ?5, ?6, 0, ?7, NULL
            FROM sessions s
            WHERE s.id = ?2 AND s.user_id = ?1 AND s.deleted_at IS NULL
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(u64_to_i64("session_id", completion.session_id.value())?)
        .bind(completion.completed_at)
        .bind(i64::from(completion.content.actual_duration()))
        .bind(completion.content.notes())
        .bind(exercises_to_json(&completion.content)?)
        .bind(completion.idempotency_key.map(|k| k.to_string()))
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("completion id sign overflow".into()))?;

        let (account_before, account_after) = apply_delta(&mut tx, user_id, credit, at).await?;

        tx.commit().await.map_err(conn)?;

        Ok(LedgerWrite {
            completion: completion.into_record(CompletionId::new(id)),
            account_before,
            account_after,
        })
    }

    async fn replace_completion(
        &self,
        updated: &CompletionRecord,
        expected_revision: u64,
        diff: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            UPDATE completions
            SET actual_duration = ?3,
                notes = ?4,
                exercises_json = ?5,
                revision = ?6,
                updated_at = ?7
            WHERE id = ?1 AND user_id = ?2 AND revision = ?8
            ",
        )
        .bind(u64_to_i64("completion_id", updated.id().value())?)
        .bind(u64_to_i64("user_id", updated.user_id().value())?)
        .bind(i64::from(updated.content().actual_duration()))
        .bind(updated.content().notes())
        .bind(exercises_to_json(updated.content())?)
        .bind(u64_to_i64("revision", updated.revision())?)
        .bind(updated.updated_at())
        .bind(u64_to_i64("revision", expected_revision)?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(missing_or_stale(&mut tx, updated.id(), updated.user_id()).await?);
        }

        let (account_before, account_after) =
            apply_delta(&mut tx, updated.user_id(), diff, at).await?;

        tx.commit().await.map_err(conn)?;

        Ok(LedgerWrite {
            completion: updated.clone(),
            account_before,
            account_after,
        })
    }

    async fn remove_completion(
        &self,
        record: &CompletionRecord,
        debit: &AccountDelta,
        at: DateTime<Utc>,
    ) -> Result<LedgerWrite, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            "DELETE FROM completions WHERE id = ?1 AND user_id = ?2 AND revision = ?3",
        )
        .bind(u64_to_i64("completion_id", record.id().value())?)
        .bind(u64_to_i64("user_id", record.user_id().value())?)
        .bind(u64_to_i64("revision", record.revision())?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(missing_or_stale(&mut tx, record.id(), record.user_id()).await?);
        }

        let (account_before, account_after) =
            apply_delta(&mut tx, record.user_id(), debit, at).await?;

        tx.commit().await.map_err(conn)?;

        Ok(LedgerWrite {
            completion: record.clone(),
            account_before,
            account_after,
        })
    }

    async fn ledger_snapshot(&self, user_id: UserId) -> Result<LedgerSnapshot, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let account = load_account(&mut tx, user_id).await?;
        let rows = sqlx::query(&format!(
            r"
            SELECT {COMPLETION_COLUMNS} FROM completions
            WHERE user_id = ?1
            ORDER BY completed_at ASC, id ASC
            "
        ))
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_all(&mut *tx)
        .await
        .map_err(conn)?;

        let completions = rows
            .iter()
            .map(map_completion_row)
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await.map_err(conn)?;

        Ok(LedgerSnapshot {
            account,
            completions,
        })
    }

    async fn overwrite_totals(
        &self,
        user_id: UserId,
        expected_version: u64,
        totals: &AccountSnapshot,
        at: DateTime<Utc>,
    ) -> Result<ProgressionAccount, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Take the write lock before reading.
        sqlx::query("UPDATE accounts SET version = version WHERE user_id = ?1")
            .bind(u64_to_i64("user_id", user_id.value())?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        let mut account = load_account(&mut tx, user_id).await?;
        if account.version() != expected_version {
            return Err(StorageError::Conflict);
        }
        account.restore(totals, at);

        if store_totals(&mut tx, &account, expected_version).await? == 0 {
            return Err(StorageError::Conflict);
        }

        tx.commit().await.map_err(conn)?;
        Ok(account)
    }
}
