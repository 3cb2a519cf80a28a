mod exercise;
mod ids;
mod response;
mod result;
mod session;
mod tier;

pub use ids::{ExerciseId, ParseIdError, SessionId, SubjectId};
pub use tier::{DifficultyTier, ParseEnumError};

pub use exercise::{ExerciseDraft, ExerciseError, ExerciseItem, ExerciseKind, Topic};
pub use response::{Outcome, ResponseRecord};
pub use result::{ResultError, ResultProfile, ScoringThresholds, Tally};
pub use session::{
    Advance, AssessmentKind, PersistedSession, SessionRecord, SessionStateError, SessionStatus,
};
