use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::exercise::Topic;
use crate::model::ids::{ExerciseId, SessionId, SubjectId};
use crate::model::tier::{DifficultyTier, ParseEnumError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session is {status}, not in progress")]
    NotInProgress { status: SessionStatus },

    #[error("exercise {0} was already asked in this session")]
    DuplicateExercise(ExerciseId),

    #[error("session already reached its target of {total} questions")]
    TargetReached { total: u32 },

    #[error("total questions must be > 0")]
    InvalidTotal,

    #[error("a session needs at least one topic")]
    NoTopics,

    #[error("inconsistent persisted session: {0}")]
    Corrupt(String),
}

//
// ─── STATUS / KIND ─────────────────────────────────────────────────────────────
//

/// Lifecycle of a session. `Completed` and `Abandoned` are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(ParseEnumError::new("session status", s)),
        }
    }
}

/// Purpose of an assessment. A subject may have one active session per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Placement,
    Progress,
    Practice,
}

impl AssessmentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placement => "placement",
            Self::Progress => "progress",
            Self::Practice => "practice",
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placement" => Ok(Self::Placement),
            "progress" => Ok(Self::Progress),
            "practice" => Ok(Self::Practice),
            _ => Err(ParseEnumError::new("assessment kind", s)),
        }
    }
}

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// What happens after the current question has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Ask `exercise` next, at `tier`.
    Next {
        exercise: ExerciseId,
        tier: DifficultyTier,
    },
    /// No further questions; the session completes.
    Complete,
}

//
// ─── SESSION RECORD ────────────────────────────────────────────────────────────
//

/// Raw fields of a stored session, before invariants are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub id: SessionId,
    pub subject_id: SubjectId,
    pub kind: AssessmentKind,
    pub status: SessionStatus,
    pub current_difficulty: DifficultyTier,
    pub current_index: u32,
    pub question_sequence: Vec<ExerciseId>,
    pub topics: Vec<Topic>,
    pub total_questions: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// One assessment attempt.
///
/// The question sequence is append-only and only grows through
/// [`SessionRecord::advance`]. Every mutation bumps `version`, which storage
/// uses as a compare-and-swap token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    id: SessionId,
    subject_id: SubjectId,
    kind: AssessmentKind,
    status: SessionStatus,
    current_difficulty: DifficultyTier,
    current_index: u32,
    question_sequence: Vec<ExerciseId>,
    topics: Vec<Topic>,
    total_questions: u32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl SessionRecord {
    /// Opens a session whose first question is `first_exercise` at `first_tier`.
    ///
    /// Duplicate topics are dropped, keeping first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTotal` for a zero target and `NoTopics` for an empty topic list.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        id: SessionId,
        subject_id: SubjectId,
        kind: AssessmentKind,
        topics: &[Topic],
        total_questions: u32,
        first_exercise: ExerciseId,
        first_tier: DifficultyTier,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if total_questions == 0 {
            return Err(SessionStateError::InvalidTotal);
        }
        let topics = dedup_topics(topics);
        if topics.is_empty() {
            return Err(SessionStateError::NoTopics);
        }

        Ok(Self {
            id,
            subject_id,
            kind,
            status: SessionStatus::InProgress,
            current_difficulty: first_tier,
            current_index: 0,
            question_sequence: vec![first_exercise],
            topics,
            total_questions,
            started_at: now,
            completed_at: None,
            version: 1,
        })
    }

    /// Rehydrates a stored session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Corrupt` when the stored fields contradict each other.
    pub fn from_persisted(p: PersistedSession) -> Result<Self, SessionStateError> {
        let corrupt = |msg: &str| SessionStateError::Corrupt(format!("{}: {msg}", p.id));

        if p.total_questions == 0 {
            return Err(corrupt("zero total_questions"));
        }
        if p.topics.is_empty() {
            return Err(corrupt("no topics"));
        }
        if p.current_index > p.total_questions {
            return Err(corrupt("current_index beyond total_questions"));
        }
        let mut seen = HashSet::with_capacity(p.question_sequence.len());
        if !p.question_sequence.iter().all(|id| seen.insert(*id)) {
            return Err(corrupt("question_sequence has duplicates"));
        }

        let asked = p.question_sequence.len();
        let index = p.current_index as usize;
        let shape_ok = match p.status {
            SessionStatus::InProgress => asked == index + 1 && p.current_index < p.total_questions,
            SessionStatus::Completed => asked == index,
            SessionStatus::Abandoned => asked == index || asked == index + 1,
        };
        if !shape_ok {
            return Err(corrupt("question_sequence length does not match status"));
        }
        match (p.status.is_terminal(), p.completed_at) {
            (true, None) => return Err(corrupt("terminal session without completed_at")),
            (false, Some(_)) => return Err(corrupt("active session with completed_at")),
            (_, Some(done)) if done < p.started_at => {
                return Err(corrupt("completed_at before started_at"));
            }
            _ => {}
        }

        Ok(Self {
            id: p.id,
            subject_id: p.subject_id,
            kind: p.kind,
            status: p.status,
            current_difficulty: p.current_difficulty,
            current_index: p.current_index,
            question_sequence: p.question_sequence,
            topics: p.topics,
            total_questions: p.total_questions,
            started_at: p.started_at,
            completed_at: p.completed_at,
            version: p.version,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    #[must_use]
    pub fn kind(&self) -> AssessmentKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn current_difficulty(&self) -> DifficultyTier {
        self.current_difficulty
    }

    #[must_use]
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    #[must_use]
    pub fn question_sequence(&self) -> &[ExerciseId] {
        &self.question_sequence
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn is_owned_by(&self, subject: &SubjectId) -> bool {
        &self.subject_id == subject
    }

    /// The exercise waiting for an answer, if the session is still running.
    #[must_use]
    pub fn current_exercise(&self) -> Option<ExerciseId> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        self.question_sequence
            .get(self.current_index as usize)
            .copied()
    }

    /// Topic preferred for the question at `position`: topics rotate round-robin.
    #[must_use]
    pub fn topic_for(&self, position: u32) -> Topic {
        self.topics[position as usize % self.topics.len()]
    }

    /// Whether answering the current question exhausts the target length.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 >= self.total_questions
    }

    /// Records that the current question was answered and moves on.
    ///
    /// # Errors
    ///
    /// - `NotInProgress` if the session is terminal
    /// - `TargetReached` if `Advance::Next` is requested after the last question
    /// - `DuplicateExercise` if the next exercise was already asked
    pub fn advance(&mut self, step: Advance, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.ensure_in_progress()?;

        match step {
            Advance::Next { exercise, tier } => {
                if self.is_last_question() {
                    return Err(SessionStateError::TargetReached {
                        total: self.total_questions,
                    });
                }
                if self.question_sequence.contains(&exercise) {
                    return Err(SessionStateError::DuplicateExercise(exercise));
                }
                self.question_sequence.push(exercise);
                self.current_difficulty = tier;
                self.current_index += 1;
            }
            Advance::Complete => {
                self.current_index += 1;
                self.status = SessionStatus::Completed;
                self.completed_at = Some(now.max(self.started_at));
            }
        }

        self.version += 1;
        Ok(())
    }

    /// Ends the session without a result.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` if the session is already terminal.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.ensure_in_progress()?;
        self.status = SessionStatus::Abandoned;
        self.completed_at = Some(now.max(self.started_at));
        self.version += 1;
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), SessionStateError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(SessionStateError::NotInProgress {
                status: self.status,
            })
        }
    }
}

fn dedup_topics(topics: &[Topic]) -> Vec<Topic> {
    let mut seen = HashSet::new();
    topics.iter().copied().filter(|t| seen.insert(*t)).collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
