use std::str::FromStr;

use assess_core::model::{
    ExerciseDraft, ExerciseId, ExerciseItem, PersistedSession, ResponseRecord, SessionId,
    SessionRecord, SubjectId, Topic,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps constraint violations onto the storage error vocabulary.
///
/// Unique and primary-key violations become `Conflict`, foreign-key violations
/// `NotFound`; everything else is a connection-level failure.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn exercise_id_from_i64(v: i64) -> Result<ExerciseId, StorageError> {
    Ok(ExerciseId::new(i64_to_u64("exercise_id", v)?))
}

/// Topics are stored as a comma-separated list in session order.
pub(crate) fn topics_to_text(topics: &[Topic]) -> String {
    topics
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn topics_from_text(raw: &str) -> Result<Vec<Topic>, StorageError> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| Topic::from_str(s).map_err(ser))
        .collect()
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(ser)?;
    T::from_str(&raw).map_err(ser)
}

pub(crate) fn map_exercise_row(row: &SqliteRow) -> Result<ExerciseItem, StorageError> {
    let options_json: String = row.try_get("options_json").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;

    ExerciseDraft {
        id: exercise_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        topic: parse_column(row, "topic")?,
        tier: parse_column(row, "tier")?,
        kind: parse_column(row, "kind")?,
        prompt: row.try_get("prompt").map_err(ser)?,
        expected_answer: row.try_get("expected_answer").map_err(ser)?,
        options,
        explanation: row.try_get("explanation").map_err(ser)?,
    }
    .validate()
    .map_err(ser)
}

/// Builds a session from its row plus the ordered question sequence.
pub(crate) fn map_session_row(
    row: &SqliteRow,
    question_sequence: Vec<ExerciseId>,
) -> Result<SessionRecord, StorageError> {
    let topics: String = row.try_get("topics").map_err(ser)?;

    SessionRecord::from_persisted(PersistedSession {
        id: parse_column(row, "id")?,
        subject_id: SubjectId::new(row.try_get::<String, _>("subject_id").map_err(ser)?)
            .map_err(ser)?,
        kind: parse_column(row, "kind")?,
        status: parse_column(row, "status")?,
        current_difficulty: parse_column(row, "current_difficulty")?,
        current_index: i64_to_u32(
            "current_index",
            row.try_get::<i64, _>("current_index").map_err(ser)?,
        )?,
        question_sequence,
        topics: topics_from_text(&topics)?,
        total_questions: i64_to_u32(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        version: i64_to_u64("version", row.try_get::<i64, _>("version").map_err(ser)?)?,
    })
    .map_err(ser)
}

pub(crate) fn map_response_row(row: &SqliteRow) -> Result<ResponseRecord, StorageError> {
    let latency: Option<i64> = row.try_get("response_latency_ms").map_err(ser)?;

    Ok(ResponseRecord {
        session_id: parse_column::<SessionId>(row, "session_id")?,
        exercise_id: exercise_id_from_i64(row.try_get::<i64, _>("exercise_id").map_err(ser)?)?,
        position: i64_to_u32("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
        topic: parse_column(row, "topic")?,
        submitted_answer: row.try_get("submitted_answer").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        difficulty_at_time: parse_column(row, "difficulty_at_time")?,
        response_latency_ms: latency
            .map(|v| i64_to_u32("response_latency_ms", v))
            .transpose()?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}
