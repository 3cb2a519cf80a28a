use assess_core::model::{ResultProfile, SessionId};

use super::SqliteRepository;
use super::mapping::{db_err, ser};
use crate::repository::{ResultRepository, StorageError};

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn insert_result(&self, profile: &ResultProfile) -> Result<(), StorageError> {
        let profile_json = serde_json::to_string(profile).map_err(ser)?;

        // No upsert: a second profile for the same session is a conflict.
        sqlx::query(
            r"
                INSERT INTO result_profiles (session_id, final_score, generated_at, profile_json)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(profile.session_id().to_string())
        .bind(profile.final_score())
        .bind(profile.generated_at())
        .bind(profile_json)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_result(&self, session: SessionId) -> Result<Option<ResultProfile>, StorageError> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT profile_json FROM result_profiles WHERE session_id = ?1")
                .bind(session.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        json.map(|raw| serde_json::from_str(&raw).map_err(ser))
            .transpose()
    }
}
