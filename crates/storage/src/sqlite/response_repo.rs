use assess_core::model::{ResponseRecord, SessionId, SessionRecord};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_response_row};
use super::session_repo::replace_session;
use crate::repository::{AnswerPersistence, ResponseRepository, StorageError};

#[async_trait::async_trait]
impl ResponseRepository for SqliteRepository {
    async fn responses_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<ResponseRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    session_id, exercise_id, position, topic, submitted_answer,
                    is_correct, difficulty_at_time, response_latency_ms, answered_at
                FROM responses
                WHERE session_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_response_row).collect()
    }
}

#[async_trait::async_trait]
impl AnswerPersistence for SqliteRepository {
    async fn record_answer(
        &self,
        session: &SessionRecord,
        expected_version: u64,
        response: &ResponseRecord,
    ) -> Result<(), StorageError> {
        if response.session_id != session.id() {
            return Err(StorageError::Conflict);
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        replace_session(&mut tx, session, expected_version).await?;

        sqlx::query(
            r"
                INSERT INTO responses (
                    session_id, exercise_id, position, topic, submitted_answer,
                    is_correct, difficulty_at_time, response_latency_ms, answered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(response.session_id.to_string())
        .bind(id_i64("exercise_id", response.exercise_id.value())?)
        .bind(i64::from(response.position))
        .bind(response.topic.as_str())
        .bind(response.submitted_answer.as_str())
        .bind(response.is_correct)
        .bind(response.difficulty_at_time.as_str())
        .bind(response.response_latency_ms.map(i64::from))
        .bind(response.answered_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
