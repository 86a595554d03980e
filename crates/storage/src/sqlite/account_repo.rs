use training_core::model::{ProgressionAccount, UserId};

use super::SqliteRepository;
use super::mapping::{ACCOUNT_COLUMNS, conn, map_account_row, u64_to_i64, write_error};
use crate::repository::{AccountRepository, StorageError};

#[async_trait::async_trait]
impl AccountRepository for SqliteRepository {
    async fn create_account(&self, account: &ProgressionAccount) -> Result<(), StorageError> {
        let stats = account.stats();
        sqlx::query(
            r"
            INSERT INTO accounts (
                user_id, xp, total_sessions_completed, total_workout_time,
                total_weight_lifted, version, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
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
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn get_account(
        &self,
        user_id: UserId,
    ) -> Result<Option<ProgressionAccount>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1"
        ))
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_account_row).transpose()
    }
}
