mod engine;
mod finalizer;
mod picker;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use engine::AssessmentEngine;
pub use finalizer::Finalizer;
pub use view::{
    Answer, CurrentQuestion, GradedAnswer, QuestionView, SessionSnapshot, SubmitOutcome,
};
