use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::grading::{self, answers_match};
use crate::model::ids::ExerciseId;
use crate::model::tier::{DifficultyTier, ParseEnumError};

//
// ─── TOPIC ─────────────────────────────────────────────────────────────────────
//

/// Skill area an exercise exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Grammar,
    Conjugation,
    Vocabulary,
    Comprehension,
    Listening,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Self::Grammar,
        Self::Conjugation,
        Self::Vocabulary,
        Self::Comprehension,
        Self::Listening,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grammar => "grammar",
            Self::Conjugation => "conjugation",
            Self::Vocabulary => "vocabulary",
            Self::Comprehension => "comprehension",
            Self::Listening => "listening",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| ParseEnumError::new("topic", s))
    }
}

//
// ─── EXERCISE KIND ─────────────────────────────────────────────────────────────
//

/// How an exercise is answered, which also decides how it is graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    /// Pick one of `options`.
    Quiz,
    /// Free text compared against the expected answer.
    OpenResponse,
    /// `left=right` pairs, comma separated.
    Matching,
}

impl ExerciseKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::OpenResponse => "open_response",
            Self::Matching => "matching",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "quiz" => Ok(Self::Quiz),
            "open_response" => Ok(Self::OpenResponse),
            "matching" => Ok(Self::Matching),
            _ => Err(ParseEnumError::new("exercise kind", s)),
        }
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExerciseError {
    #[error("exercise {0}: prompt cannot be empty")]
    EmptyPrompt(ExerciseId),

    #[error("exercise {0}: expected answer cannot be empty")]
    EmptyAnswer(ExerciseId),

    #[error("exercise {0}: quiz needs at least two options")]
    TooFewOptions(ExerciseId),

    #[error("exercise {0}: expected answer is not one of the options")]
    AnswerNotAnOption(ExerciseId),

    #[error("exercise {0}: two options grade as the same answer")]
    AmbiguousOptions(ExerciseId),

    #[error("exercise {0}: matching answer must be `left=right` pairs")]
    MalformedPairs(ExerciseId),

    #[error("exercise {0}: only quiz and matching exercises take options")]
    UnexpectedOptions(ExerciseId),
}

//
// ─── EXERCISE ──────────────────────────────────────────────────────────────────
//

/// Unvalidated catalog entry, as curated offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseDraft {
    pub id: ExerciseId,
    pub topic: Topic,
    #[serde(alias = "difficulty")]
    pub tier: DifficultyTier,
    pub kind: ExerciseKind,
    pub prompt: String,
    pub expected_answer: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl ExerciseDraft {
    /// Checks the draft against the rules for its kind.
    ///
    /// # Errors
    ///
    /// Returns `ExerciseError` describing the first rule violated.
    pub fn validate(self) -> Result<ExerciseItem, ExerciseError> {
        let id = self.id;
        let prompt = self.prompt.trim().to_owned();
        if prompt.is_empty() {
            return Err(ExerciseError::EmptyPrompt(id));
        }
        let expected_answer = self.expected_answer.trim().to_owned();
        if expected_answer.is_empty() {
            return Err(ExerciseError::EmptyAnswer(id));
        }
        let options: Vec<String> = self
            .options
            .into_iter()
            .map(|o| o.trim().to_owned())
            .filter(|o| !o.is_empty())
            .collect();

        match self.kind {
            ExerciseKind::Quiz => {
                if options.len() < 2 {
                    return Err(ExerciseError::TooFewOptions(id));
                }
                let mut forms = HashSet::with_capacity(options.len());
                if !options
                    .iter()
                    .all(|o| forms.insert(grading::normalize_choice(o)))
                {
                    return Err(ExerciseError::AmbiguousOptions(id));
                }
                let wanted = grading::normalize_choice(&expected_answer);
                if !options
                    .iter()
                    .any(|o| grading::normalize_choice(o) == wanted)
                {
                    return Err(ExerciseError::AnswerNotAnOption(id));
                }
            }
            ExerciseKind::Matching => {
                if grading::parse_pairs(&expected_answer).is_none() {
                    return Err(ExerciseError::MalformedPairs(id));
                }
            }
            ExerciseKind::OpenResponse => {
                if !options.is_empty() {
                    return Err(ExerciseError::UnexpectedOptions(id));
                }
            }
        }

        Ok(ExerciseItem {
            id,
            topic: self.topic,
            tier: self.tier,
            kind: self.kind,
            prompt,
            expected_answer,
            options,
            explanation: self
                .explanation
                .map(|e| e.trim().to_owned())
                .filter(|e| !e.is_empty()),
        })
    }
}

/// Immutable, validated catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExerciseItem {
    id: ExerciseId,
    topic: Topic,
    tier: DifficultyTier,
    kind: ExerciseKind,
    prompt: String,
    expected_answer: String,
    options: Vec<String>,
    explanation: Option<String>,
}

impl ExerciseItem {
    #[must_use]
    pub fn id(&self) -> ExerciseId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }

    #[must_use]
    pub fn tier(&self) -> DifficultyTier {
        self.tier
    }

    #[must_use]
    pub fn kind(&self) -> ExerciseKind {
        self.kind
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn expected_answer(&self) -> &str {
        &self.expected_answer
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Grades a submitted answer against the expected one.
    #[must_use]
    pub fn grade(&self, submitted: &str) -> bool {
        answers_match(self.kind, &self.expected_answer, submitted)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
