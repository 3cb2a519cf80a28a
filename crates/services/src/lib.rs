#![forbid(unsafe_code)]

pub mod bank;
pub mod config;
pub mod error;
pub mod sessions;

pub use assess_core::Clock;

pub use bank::{Catalog, ExerciseBank, SelectionQuery};
pub use config::EngineConfig;
pub use error::{CatalogError, ConfigError, EngineInitError, SessionError};
pub use sessions::{
    Answer, AssessmentEngine, CurrentQuestion, Finalizer, GradedAnswer, QuestionView,
    SessionSnapshot, SubmitOutcome,
};
