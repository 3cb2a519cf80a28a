//! One function per subcommand. Each returns the JSON document to print.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use assess_core::Clock;
use assess_core::model::{AssessmentKind, ExerciseId, SessionId, SubjectId, Topic};
use services::{Answer, AssessmentEngine, Catalog, EngineConfig};

use crate::db::{normalize_sqlite_url, prepare_sqlite_file};

#[derive(Serialize)]
struct SeedReport {
    imported: usize,
    catalog_size: u64,
}

pub async fn open_engine(
    db: &str,
    config: Option<&Path>,
    seed: Option<u64>,
) -> Result<AssessmentEngine> {
    let config = match config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_toml_str(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    let db_url = normalize_sqlite_url(db)?;
    prepare_sqlite_file(&db_url)?;
    tracing::debug!(db = %db_url, "opening database");

    let engine = AssessmentEngine::new_sqlite(&db_url, config, Clock::system())
        .await
        .with_context(|| format!("opening {db_url}"))?;
    Ok(match seed {
        Some(seed) => engine.with_selection_seed(seed),
        None => engine,
    })
}

pub async fn seed(engine: &AssessmentEngine, catalog: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(catalog)
        .with_context(|| format!("reading catalog {}", catalog.display()))?;
    let parsed = Catalog::from_toml_str(&raw)
        .with_context(|| format!("invalid catalog {}", catalog.display()))?;
    let imported = engine.bank().import(parsed).await?;
    let catalog_size = engine.bank().catalog_size().await?;
    Ok(serde_json::to_value(SeedReport {
        imported,
        catalog_size,
    })?)
}

pub async fn start(
    engine: &AssessmentEngine,
    subject: &SubjectId,
    kind: AssessmentKind,
    total: Option<u32>,
    topics: &[Topic],
) -> Result<Value> {
    let started = engine.start(subject, kind, total, topics).await?;
    Ok(serde_json::to_value(started)?)
}

pub async fn question(
    engine: &AssessmentEngine,
    subject: &SubjectId,
    session: SessionId,
) -> Result<Value> {
    Ok(serde_json::to_value(engine.resume(session, subject).await?)?)
}

pub async fn answer(
    engine: &AssessmentEngine,
    subject: &SubjectId,
    session: SessionId,
    text: String,
    exercise: Option<ExerciseId>,
    latency_ms: Option<u32>,
) -> Result<Value> {
    let mut answer = Answer::new(text);
    if let Some(id) = exercise {
        answer = answer.for_exercise(id);
    }
    if let Some(ms) = latency_ms {
        answer = answer.with_latency_ms(ms);
    }
    let outcome = engine.submit_answer(session, subject, answer).await?;
    if outcome.is_complete() {
        tracing::info!(
            session = %session,
            answered = outcome.session().current_index,
            "assessment finished, result included"
        );
    }
    Ok(serde_json::to_value(outcome)?)
}

pub async fn abandon(
    engine: &AssessmentEngine,
    subject: &SubjectId,
    session: SessionId,
) -> Result<Value> {
    Ok(serde_json::to_value(engine.abandon(session, subject).await?)?)
}

pub async fn result(
    engine: &AssessmentEngine,
    subject: &SubjectId,
    session: SessionId,
) -> Result<Value> {
    Ok(serde_json::to_value(engine.get_result(session, subject).await?)?)
}

pub async fn history(engine: &AssessmentEngine, subject: &SubjectId, limit: u32) -> Result<Value> {
    Ok(serde_json::to_value(engine.history(subject, limit).await?)?)
}
