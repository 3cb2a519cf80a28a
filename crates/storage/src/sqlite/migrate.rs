use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates the catalog, sessions with their question sequence,
/// responses, result profiles, and indexes.
#[allow(clippy::too_many_lines)]
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
                CREATE TABLE IF NOT EXISTS exercises (
                    id INTEGER PRIMARY KEY,
                    topic TEXT NOT NULL,
                    tier TEXT NOT NULL CHECK (tier IN ('easy', 'medium', 'hard')),
                    kind TEXT NOT NULL,
                    prompt TEXT NOT NULL,
                    expected_answer TEXT NOT NULL,
                    options_json TEXT NOT NULL DEFAULT '[]',
                    explanation TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    subject_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    status TEXT NOT NULL
                        CHECK (status IN ('in_progress', 'completed', 'abandoned')),
                    current_difficulty TEXT NOT NULL,
                    current_index INTEGER NOT NULL CHECK (current_index >= 0),
                    topics TEXT NOT NULL,
                    total_questions INTEGER NOT NULL CHECK (total_questions > 0),
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    version INTEGER NOT NULL CHECK (version > 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_questions (
                    session_id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    exercise_id INTEGER NOT NULL,
                    PRIMARY KEY (session_id, position),
                    UNIQUE (session_id, exercise_id),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS responses (
                    session_id TEXT NOT NULL,
                    exercise_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    topic TEXT NOT NULL,
                    submitted_answer TEXT NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    difficulty_at_time TEXT NOT NULL,
                    response_latency_ms INTEGER CHECK (response_latency_ms >= 0),
                    answered_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, exercise_id),
                    UNIQUE (session_id, position),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS result_profiles (
                    session_id TEXT PRIMARY KEY,
                    final_score REAL NOT NULL CHECK (final_score BETWEEN 0 AND 100),
                    generated_at TEXT NOT NULL,
                    profile_json TEXT NOT NULL,
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // At most one running session per subject and assessment kind.
        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_in_progress
                    ON sessions (subject_id, kind)
                    WHERE status = 'in_progress';
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_subject_started
                    ON sessions (subject_id, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_exercises_topic_tier
                    ON exercises (topic, tier, id);
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
