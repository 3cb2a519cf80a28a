#![allow(dead_code)]

use assess_core::model::{DifficultyTier, ExerciseDraft, ExerciseId, ExerciseKind, SubjectId, Topic};
use assess_core::time::fixed_now;
use services::{AssessmentEngine, Clock, EngineConfig};
use storage::repository::{ExerciseRepository, InMemoryRepository, Storage};

/// Open-response exercise whose expected answer is `a{id}`.
pub async fn add_exercise(repo: &InMemoryRepository, id: u64, topic: Topic, tier: DifficultyTier) {
    let item = ExerciseDraft {
        id: ExerciseId::new(id),
        topic,
        tier,
        kind: ExerciseKind::OpenResponse,
        prompt: format!("Question {id}"),
        expected_answer: format!("a{id}"),
        options: Vec::new(),
        explanation: None,
    }
    .validate()
    .unwrap();
    repo.upsert_exercise(&item).await.unwrap();
}

/// Four exercises for every topic and tier.
pub async fn full_catalog(repo: &InMemoryRepository) {
    let mut id = 1;
    for topic in Topic::ALL {
        for tier in DifficultyTier::ALL {
            for _ in 0..4 {
                add_exercise(repo, id, topic, tier).await;
                id += 1;
            }
        }
    }
}

pub fn right_answer(id: ExerciseId) -> String {
    format!("A{}", id.value())
}

pub fn engine(storage: &Storage) -> AssessmentEngine {
    AssessmentEngine::new(storage, EngineConfig::default(), Clock::fixed(fixed_now()))
        .unwrap()
        .with_selection_seed(42)
}

pub fn subject(name: &str) -> SubjectId {
    SubjectId::new(name).unwrap()
}
