//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::{
    AssessmentKind, ExerciseError, ExerciseId, ResultError, SessionId, SessionStateError,
    SessionStatus, SubjectId,
};
use assess_core::policy::PolicyError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the assessment engine and the finalizer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("{subject} already has an in-progress {kind} session")]
    ActiveSessionExists {
        subject: SubjectId,
        kind: AssessmentKind,
    },
    #[error("session {0} was changed concurrently")]
    VersionConflict(SessionId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("exercise {0} not found")]
    ExerciseNotFound(ExerciseId),
    #[error("session {0} belongs to another subject")]
    Forbidden(SessionId),
    #[error("session {session} is {status}")]
    InvalidState {
        session: SessionId,
        status: SessionStatus,
    },
    #[error("answer is for exercise {submitted}, current question is {current}")]
    StaleAnswer {
        current: ExerciseId,
        submitted: ExerciseId,
    },
    #[error("no exercises available for the requested topics")]
    NoExercisesAvailable,
    #[error("total questions must be between 1 and {max}, got {requested}")]
    InvalidTotalQuestions { requested: u32, max: u32 },
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// True for both the duplicate active session and the lost optimistic race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ActiveSessionExists { .. } | Self::VersionConflict(_)
        )
    }
}

/// Errors emitted while loading or validating `EngineConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("max_total_questions must be > 0")]
    ZeroMaxTotal,
    #[error("default_total_questions must be between 1 and {max}, got {default}")]
    InvalidDefaultTotal { default: u32, max: u32 },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Scoring(#[from] ResultError),
}

/// Errors emitted while importing a catalog into the Exercise Bank.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("invalid catalog file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("exercise {0} appears more than once in the catalog")]
    DuplicateId(ExerciseId),
    #[error(transparent)]
    Exercise(#[from] ExerciseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
