use assess_core::model::{AssessmentKind, ExerciseId, SessionId, SessionRecord, SubjectId};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{db_err, exercise_id_from_i64, id_i64, map_session_row, ser, topics_to_text};
use crate::repository::{SessionRepository, StorageError};

const SESSION_COLUMNS: &str = r"
    id, subject_id, kind, status, current_difficulty, current_index, topics,
    total_questions, started_at, completed_at, version
";

pub(super) async fn load_sequence(
    conn: &mut SqliteConnection,
    id: SessionId,
) -> Result<Vec<ExerciseId>, StorageError> {
    let rows = sqlx::query(
        r"
            SELECT exercise_id
            FROM session_questions
            WHERE session_id = ?1
            ORDER BY position ASC
        ",
    )
    .bind(id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.iter()
        .map(|row| exercise_id_from_i64(row.try_get::<i64, _>("exercise_id").map_err(ser)?))
        .collect()
}

async fn load_session(
    conn: &mut SqliteConnection,
    id: SessionId,
) -> Result<Option<SessionRecord>, StorageError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    match row {
        Some(row) => {
            let sequence = load_sequence(conn, id).await?;
            Ok(Some(map_session_row(&row, sequence)?))
        }
        None => Ok(None),
    }
}

async fn append_questions(
    conn: &mut SqliteConnection,
    id: SessionId,
    from: usize,
    sequence: &[ExerciseId],
) -> Result<(), StorageError> {
    for (position, exercise) in sequence.iter().enumerate().skip(from) {
        sqlx::query(
            r"
                INSERT INTO session_questions (session_id, position, exercise_id)
                VALUES (?1, ?2, ?3)
            ",
        )
        .bind(id.to_string())
        .bind(i64::try_from(position).map_err(ser)?)
        .bind(id_i64("exercise_id", exercise.value())?)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

/// Compare-and-swap replacement of a session row inside an open transaction.
///
/// The guarded `UPDATE` runs first so the write lock is taken before
/// anything is read; a losing writer then sees the bumped version.
pub(super) async fn replace_session(
    conn: &mut SqliteConnection,
    session: &SessionRecord,
    expected_version: u64,
) -> Result<(), StorageError> {
    let updated = sqlx::query(
        r"
            UPDATE sessions SET
                status = ?1,
                current_difficulty = ?2,
                current_index = ?3,
                completed_at = ?4,
                version = ?5
            WHERE id = ?6 AND version = ?7
        ",
    )
    .bind(session.status().as_str())
    .bind(session.current_difficulty().as_str())
    .bind(i64::from(session.current_index()))
    .bind(session.completed_at())
    .bind(id_i64("version", session.version())?)
    .bind(session.id().to_string())
    .bind(id_i64("version", expected_version)?)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    if updated.rows_affected() == 0 {
        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session.id().to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
        return Err(if exists.is_some() {
            StorageError::Conflict
        } else {
            StorageError::NotFound
        });
    }

    let stored = load_sequence(conn, session.id()).await?;
    if !session.question_sequence().starts_with(&stored) {
        return Err(StorageError::Conflict);
    }
    append_questions(conn, session.id(), stored.len(), session.question_sequence()).await
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
            INSERT INTO sessions (
                id, subject_id, kind, status, current_difficulty, current_index, topics,
                total_questions, started_at, completed_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(session.id().to_string())
        .bind(session.subject_id().as_str())
        .bind(session.kind().as_str())
        .bind(session.status().as_str())
        .bind(session.current_difficulty().as_str())
        .bind(i64::from(session.current_index()))
        .bind(topics_to_text(session.topics()))
        .bind(i64::from(session.total_questions()))
        .bind(session.started_at())
        .bind(session.completed_at())
        .bind(id_i64("version", session.version())?)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        append_questions(&mut tx, session.id(), 0, session.question_sequence()).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_session(&mut conn, id).await
    }

    async fn find_in_progress(
        &self,
        subject: &SubjectId,
        kind: AssessmentKind,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let id: Option<String> = sqlx::query_scalar(
            r"
                SELECT id FROM sessions
                WHERE subject_id = ?1 AND kind = ?2 AND status = 'in_progress'
            ",
        )
        .bind(subject.as_str())
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

        match id {
            Some(raw) => load_session(&mut conn, raw.parse().map_err(ser)?).await,
            None => Ok(None),
        }
    }

    async fn update_session(
        &self,
        session: &SessionRecord,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        replace_session(&mut tx, session, expected_version).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        subject: &SubjectId,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE subject_id = ?1
             ORDER BY started_at DESC, id DESC
             LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(subject.as_str())
            .bind(i64::from(limit))
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: SessionId = row
                .try_get::<String, _>("id")
                .map_err(ser)?
                .parse()
                .map_err(ser)?;
            let sequence = load_sequence(&mut conn, id).await?;
            out.push(map_session_row(&row, sequence)?);
        }
        Ok(out)
    }

    async fn recent_exercise_ids(
        &self,
        subject: &SubjectId,
        exclude: SessionId,
        sessions: u32,
    ) -> Result<Vec<ExerciseId>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT q.exercise_id
                FROM session_questions q
                JOIN (
                    SELECT id, started_at FROM sessions
                    WHERE subject_id = ?1 AND id != ?2
                    ORDER BY started_at DESC, id DESC
                    LIMIT ?3
                ) s ON s.id = q.session_id
                ORDER BY s.started_at DESC, s.id DESC, q.position ASC
            ",
        )
        .bind(subject.as_str())
        .bind(exclude.to_string())
        .bind(i64::from(sessions))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| exercise_id_from_i64(row.try_get::<i64, _>("exercise_id").map_err(ser)?))
            .collect()
    }

    async fn purge_session(&self, id: SessionId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
