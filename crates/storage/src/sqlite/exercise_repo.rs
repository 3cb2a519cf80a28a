use assess_core::model::{DifficultyTier, ExerciseId, ExerciseItem, Topic};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_exercise_row, ser};
use crate::repository::{ExerciseRepository, StorageError};

#[async_trait::async_trait]
impl ExerciseRepository for SqliteRepository {
    async fn upsert_exercise(&self, item: &ExerciseItem) -> Result<(), StorageError> {
        let options_json = serde_json::to_string(item.options()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO exercises (
                id, topic, tier, kind, prompt, expected_answer, options_json, explanation
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                topic = excluded.topic,
                tier = excluded.tier,
                kind = excluded.kind,
                prompt = excluded.prompt,
                expected_answer = excluded.expected_answer,
                options_json = excluded.options_json,
                explanation = excluded.explanation
            ",
        )
        .bind(id_i64("exercise_id", item.id().value())?)
        .bind(item.topic().as_str())
        .bind(item.tier().as_str())
        .bind(item.kind().as_str())
        .bind(item.prompt().to_owned())
        .bind(item.expected_answer().to_owned())
        .bind(options_json)
        .bind(item.explanation().map(str::to_owned))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_exercise(&self, id: ExerciseId) -> Result<Option<ExerciseItem>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, topic, tier, kind, prompt, expected_answer, options_json, explanation
            FROM exercises
            WHERE id = ?1
            ",
        )
        .bind(id_i64("exercise_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_exercise_row).transpose()
    }

    async fn exercises_matching(
        &self,
        topic: Topic,
        tier: DifficultyTier,
    ) -> Result<Vec<ExerciseItem>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, topic, tier, kind, prompt, expected_answer, options_json, explanation
            FROM exercises
            WHERE topic = ?1 AND tier = ?2
            ORDER BY id ASC
            ",
        )
        .bind(topic.as_str())
        .bind(tier.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_exercise_row).collect()
    }

    async fn count_exercises(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exercises")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        u64::try_from(count).map_err(ser)
    }
}
