use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::exercise::Topic;
use crate::model::ids::{SessionId, SubjectId};
use crate::model::response::ResponseRecord;
use crate::model::session::{SessionRecord, SessionStatus};
use crate::model::tier::DifficultyTier;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("cannot score a session that is {status}")]
    NotCompleted { status: SessionStatus },

    #[error("response for exercise {exercise} belongs to session {owner}")]
    ForeignResponse { exercise: u64, owner: SessionId },

    #[error("too many responses for a single session: {len}")]
    TooManyResponses { len: usize },

    #[error("weakness threshold ({weakness}) must be below strength threshold ({strength}), both in [0, 1]")]
    InvalidThresholds { strength: f64, weakness: f64 },
}

//
// ─── TALLY ─────────────────────────────────────────────────────────────────────
//

/// Correct / incorrect counts for one group of responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub correct: u32,
    pub incorrect: u32,
}

impl Tally {
    fn record(&mut self, correct: bool) {
        if correct {
            self.correct = self.correct.saturating_add(1);
        } else {
            self.incorrect = self.incorrect.saturating_add(1);
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }

    /// Fraction correct, `0.0` for an empty tally.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => f64::from(self.correct) / f64::from(n),
        }
    }
}

//
// ─── THRESHOLDS ────────────────────────────────────────────────────────────────
//

/// Per-topic ratio cut-offs for strengths and weaknesses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringThresholds {
    strength: f64,
    weakness: f64,
}

impl ScoringThresholds {
    /// # Errors
    ///
    /// Returns `InvalidThresholds` unless `0 <= weakness < strength <= 1`.
    pub fn new(strength: f64, weakness: f64) -> Result<Self, ResultError> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(strength) || !in_range(weakness) || weakness >= strength {
            return Err(ResultError::InvalidThresholds { strength, weakness });
        }
        Ok(Self { strength, weakness })
    }

    #[must_use]
    pub fn strength(&self) -> f64 {
        self.strength
    }

    #[must_use]
    pub fn weakness(&self) -> f64 {
        self.weakness
    }
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            strength: 0.7,
            weakness: 0.4,
        }
    }
}

//
// ─── RESULT PROFILE ────────────────────────────────────────────────────────────
//

/// Final learning profile of a completed session. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultProfile {
    session_id: SessionId,
    subject_id: SubjectId,
    /// Percentage correct, 0-100, one decimal.
    final_score: f64,
    total_responses: u32,
    correct_responses: u32,
    difficulty_breakdown: BTreeMap<DifficultyTier, Tally>,
    topic_breakdown: BTreeMap<Topic, Tally>,
    topics_covered: Vec<Topic>,
    strengths: Vec<Topic>,
    weaknesses: Vec<Topic>,
    generated_at: DateTime<Utc>,
}

impl ResultProfile {
    /// Scores `responses` (in submission order) for a completed session.
    ///
    /// # Errors
    ///
    /// - `NotCompleted` if the session is not completed
    /// - `ForeignResponse` if a response belongs to another session
    /// - `TooManyResponses` if the count does not fit in `u32`
    pub fn from_responses(
        session: &SessionRecord,
        responses: &[ResponseRecord],
        thresholds: &ScoringThresholds,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        if session.status() != SessionStatus::Completed {
            return Err(ResultError::NotCompleted {
                status: session.status(),
            });
        }
        let total_responses = u32::try_from(responses.len()).map_err(|_| {
            ResultError::TooManyResponses {
                len: responses.len(),
            }
        })?;

        let mut overall = Tally::default();
        let mut difficulty_breakdown: BTreeMap<DifficultyTier, Tally> = BTreeMap::new();
        let mut topic_breakdown: BTreeMap<Topic, Tally> = BTreeMap::new();

        for r in responses {
            if r.session_id != session.id() {
                return Err(ResultError::ForeignResponse {
                    exercise: r.exercise_id.value(),
                    owner: r.session_id,
                });
            }
            overall.record(r.is_correct);
            difficulty_breakdown
                .entry(r.difficulty_at_time)
                .or_default()
                .record(r.is_correct);
            topic_breakdown
                .entry(r.topic)
                .or_default()
                .record(r.is_correct);
        }

        let topics_covered: Vec<Topic> = topic_breakdown.keys().copied().collect();
        let strengths = topic_breakdown
            .iter()
            .filter(|(_, t)| t.ratio() >= thresholds.strength())
            .map(|(topic, _)| *topic)
            .collect();
        let weaknesses = topic_breakdown
            .iter()
            .filter(|(_, t)| t.ratio() <= thresholds.weakness())
            .map(|(topic, _)| *topic)
            .collect();

        Ok(Self {
            session_id: session.id(),
            subject_id: session.subject_id().clone(),
            final_score: score_percent(overall.correct, total_responses),
            total_responses,
            correct_responses: overall.correct,
            difficulty_breakdown,
            topic_breakdown,
            topics_covered,
            strengths,
            weaknesses,
            generated_at,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    #[must_use]
    pub fn final_score(&self) -> f64 {
        self.final_score
    }

    #[must_use]
    pub fn total_responses(&self) -> u32 {
        self.total_responses
    }

    #[must_use]
    pub fn correct_responses(&self) -> u32 {
        self.correct_responses
    }

    #[must_use]
    pub fn difficulty_breakdown(&self) -> &BTreeMap<DifficultyTier, Tally> {
        &self.difficulty_breakdown
    }

    #[must_use]
    pub fn topic_breakdown(&self) -> &BTreeMap<Topic, Tally> {
        &self.topic_breakdown
    }

    #[must_use]
    pub fn topics_covered(&self) -> &[Topic] {
        &self.topics_covered
    }

    #[must_use]
    pub fn strengths(&self) -> &[Topic] {
        &self.strengths
    }

    #[must_use]
    pub fn weaknesses(&self) -> &[Topic] {
        &self.weaknesses
    }

    #[must_use]
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

/// `correct / total * 100`, rounded to one decimal. Zero responses score 0.
fn score_percent(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(correct) * 1000.0 / f64::from(total)).round() / 10.0
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
