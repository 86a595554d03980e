use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use training_core::model::{
    AccountStats, CompletionContent, CompletionDraft, CompletionId, CompletionRecord, Exercise,
    ExerciseDraft, IdempotencyKey, ProgressionAccount, Session, SessionId, UserId, Weight,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Unique-index violations become `Conflict`; anything else is a connection error.
pub(crate) fn write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        _ => conn(e),
    }
}

//
// ─── CONTENT ──────────────────────────────────────────────────────────────────
//

pub(crate) fn plan_to_json(plan: &[Exercise]) -> Result<String, StorageError> {
    let drafts: Vec<ExerciseDraft> = plan.iter().map(Exercise::to_draft).collect();
    serde_json::to_string(&drafts).map_err(ser)
}

fn plan_from_json(raw: &str) -> Result<Vec<Exercise>, StorageError> {
    let drafts: Vec<ExerciseDraft> = serde_json::from_str(raw).map_err(ser)?;
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| draft.validate(index).map_err(ser))
        .collect()
}

pub(crate) fn exercises_to_json(content: &CompletionContent) -> Result<String, StorageError> {
    serde_json::to_string(&content.to_draft().exercises).map_err(ser)
}

//
// ─── ROWS ─────────────────────────────────────────────────────────────────────
//

pub(crate) fn map_account_row(row: &SqliteRow) -> Result<ProgressionAccount, StorageError> {
    let stats = AccountStats {
        total_workout_time: i64_to_u64(
            "total_workout_time",
            row.try_get("total_workout_time").map_err(ser)?,
        )?,
        total_weight_lifted: Weight::from_millis(i64_to_u64(
            "total_weight_lifted",
            row.try_get("total_weight_lifted").map_err(ser)?,
        )?),
    };

    Ok(ProgressionAccount::from_persisted(
        UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        i64_to_u64("xp", row.try_get("xp").map_err(ser)?)?,
        i64_to_u64(
            "total_sessions_completed",
            row.try_get("total_sessions_completed").map_err(ser)?,
        )?,
        stats,
        i64_to_u64("version", row.try_get("version").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    ))
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<Session, StorageError> {
    let plan_json: String = row.try_get("plan_json").map_err(ser)?;
    Ok(Session::from_persisted(
        SessionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        row.try_get("name").map_err(ser)?,
        row.try_get("description").map_err(ser)?,
        plan_from_json(&plan_json)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
        row.try_get("deleted_at").map_err(ser)?,
    ))
}

pub(crate) fn map_completion_row(row: &SqliteRow) -> Result<CompletionRecord, StorageError> {
    let exercises_json: String = row.try_get("exercises_json").map_err(ser)?;
    let content = CompletionDraft {
        actual_duration: Some(row.try_get("actual_duration").map_err(ser)?),
        notes: Some(row.try_get("notes").map_err(ser)?),
        exercises: serde_json::from_str(&exercises_json).map_err(ser)?,
    }
    .validate()
    .map_err(ser)?;

    let idempotency_key = row
        .try_get::<Option<String>, _>("idempotency_key")
        .map_err(ser)?
        .map(|raw| raw.parse::<IdempotencyKey>().map_err(ser))
        .transpose()?;
    let updated_at: Option<DateTime<Utc>> = row.try_get("updated_at").map_err(ser)?;

    Ok(CompletionRecord::from_persisted(
        CompletionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        SessionId::new(i64_to_u64("session_id", row.try_get("session_id").map_err(ser)?)?),
        row.try_get("completed_at").map_err(ser)?,
        content,
        i64_to_u64("revision", row.try_get("revision").map_err(ser)?)?,
        idempotency_key,
        updated_at,
    ))
}

pub(crate) const COMPLETION_COLUMNS: &str = "id, user_id, session_id, completed_at, \
    actual_duration, notes, exercises_json, revision, idempotency_key, updated_at";

pub(crate) const SESSION_COLUMNS: &str =
    "id, user_id, name, description, plan_json, created_at, updated_at, deleted_at";

pub(crate) const ACCOUNT_COLUMNS: &str = "user_id, xp, total_sessions_completed, \
    total_workout_time, total_weight_lifted, version, created_at, updated_at";
