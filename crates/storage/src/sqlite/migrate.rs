use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates accounts, sessions, the completion ledger, and their indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS accounts (
                    user_id INTEGER PRIMARY KEY,
                    xp INTEGER NOT NULL CHECK (xp >= 0),
                    total_sessions_completed INTEGER NOT NULL CHECK (total_sessions_completed >= 0),
                    total_workout_time INTEGER NOT NULL CHECK (total_workout_time >= 0),
                    total_weight_lifted INTEGER NOT NULL CHECK (total_weight_lifted >= 0),
                    version INTEGER NOT NULL CHECK (version >= 0),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT,
                    plan_json TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT,
                    FOREIGN KEY (user_id) REFERENCES accounts(user_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // Weight inside exercises_json is in units; account totals are in thousandths.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS completions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    session_id INTEGER NOT NULL,
                    completed_at TEXT NOT NULL,
                    actual_duration INTEGER NOT NULL CHECK (actual_duration >= 0),
                    notes TEXT NOT NULL,
                    exercises_json TEXT NOT NULL,
                    revision INTEGER NOT NULL CHECK (revision >= 0),
                    idempotency_key TEXT,
                    updated_at TEXT,
                    FOREIGN KEY (user_id) REFERENCES accounts(user_id),
                    FOREIGN KEY (session_id) REFERENCES sessions(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_user_active
                    ON sessions (user_id, deleted_at, created_at, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_completions_session_completed
                    ON completions (session_id, completed_at, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_completions_user_completed
                    ON completions (user_id, completed_at, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_completions_user_idempotency
                    ON completions (user_id, idempotency_key)
                    WHERE idempotency_key IS NOT NULL;
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
