use chrono::{DateTime, Utc};
use serde::Serialize;

use assess_core::model::{
    AssessmentKind, DifficultyTier, ExerciseId, ExerciseItem, ExerciseKind, ResultProfile,
    SessionId, SessionRecord, SessionStatus, SubjectId, Topic,
};

/// Client-facing copy of a session's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub kind: AssessmentKind,
    pub status: SessionStatus,
    pub current_difficulty: DifficultyTier,
    pub current_index: u32,
    pub total_questions: u32,
    pub question_sequence: Vec<ExerciseId>,
    pub topics: Vec<Topic>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&SessionRecord> for SessionSnapshot {
    fn from(s: &SessionRecord) -> Self {
        Self {
            session_id: s.id(),
            subject_id: s.subject_id().clone(),
            kind: s.kind(),
            status: s.status(),
            current_difficulty: s.current_difficulty(),
            current_index: s.current_index(),
            total_questions: s.total_questions(),
            question_sequence: s.question_sequence().to_vec(),
            topics: s.topics().to_vec(),
            started_at: s.started_at(),
            completed_at: s.completed_at(),
        }
    }
}

/// A question as shown to the learner. Never carries the expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub exercise_id: ExerciseId,
    /// 0-based position within the session.
    pub position: u32,
    pub topic: Topic,
    pub tier: DifficultyTier,
    pub kind: ExerciseKind,
    pub prompt: String,
    pub options: Vec<String>,
}

impl QuestionView {
    #[must_use]
    pub fn new(item: &ExerciseItem, position: u32) -> Self {
        Self {
            exercise_id: item.id(),
            position,
            topic: item.topic(),
            tier: item.tier(),
            kind: item.kind(),
            prompt: item.prompt().to_owned(),
            options: item.options().to_vec(),
        }
    }
}

/// Snapshot plus the question waiting for an answer, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentQuestion {
    pub session: SessionSnapshot,
    pub question: Option<QuestionView>,
}

/// A learner's answer to the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// The question the client believes it is answering.
    pub exercise_id: Option<ExerciseId>,
    pub latency_ms: Option<u32>,
}

impl Answer {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exercise_id: None,
            latency_ms: None,
        }
    }

    #[must_use]
    pub fn for_exercise(mut self, id: ExerciseId) -> Self {
        self.exercise_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_latency_ms(mut self, ms: u32) -> Self {
        self.latency_ms = Some(ms);
        self
    }
}

/// Feedback on one graded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradedAnswer {
    pub exercise_id: ExerciseId,
    pub position: u32,
    pub tier: DifficultyTier,
    pub is_correct: bool,
    pub expected_answer: String,
    pub explanation: Option<String>,
}

/// What happened after an answer was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Next {
        graded: GradedAnswer,
        session: SessionSnapshot,
        question: QuestionView,
    },
    Completed {
        graded: GradedAnswer,
        session: SessionSnapshot,
        result: ResultProfile,
    },
}

impl SubmitOutcome {
    #[must_use]
    pub fn graded(&self) -> &GradedAnswer {
        match self {
            Self::Next { graded, .. } | Self::Completed { graded, .. } => graded,
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionSnapshot {
        match self {
            Self::Next { session, .. } | Self::Completed { session, .. } => session,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
