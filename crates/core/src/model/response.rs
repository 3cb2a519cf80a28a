use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::exercise::Topic;
use crate::model::ids::{ExerciseId, SessionId};
use crate::model::tier::DifficultyTier;

/// One answered question. Append-only; owned by its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub session_id: SessionId,
    pub exercise_id: ExerciseId,
    /// 0-based position of the question within the session.
    pub position: u32,
    /// Topic of the exercise when it was answered.
    pub topic: Topic,
    pub submitted_answer: String,
    pub is_correct: bool,
    pub difficulty_at_time: DifficultyTier,
    pub response_latency_ms: Option<u32>,
    pub answered_at: DateTime<Utc>,
}

/// Minimal view of a response used by the difficulty policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub tier: DifficultyTier,
    pub correct: bool,
}

impl Outcome {
    #[must_use]
    pub fn new(tier: DifficultyTier, correct: bool) -> Self {
        Self { tier, correct }
    }
}

impl From<&ResponseRecord> for Outcome {
    fn from(r: &ResponseRecord) -> Self {
        Self::new(r.difficulty_at_time, r.is_correct)
    }
}
