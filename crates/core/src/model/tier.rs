use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a stored or user-supplied enum label is unknown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {raw:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub raw: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_owned(),
        }
    }
}

//
// ─── DIFFICULTY TIER ───────────────────────────────────────────────────────────
//

/// Ordered difficulty levels.
///
/// `Easy < Medium < Hard`. Movement between tiers is always one step and is
/// clamped at both ends, so no transition can leave this set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 3] = [Self::Easy, Self::Medium, Self::Hard];

    /// One tier up, staying at `Hard` when already there.
    #[must_use]
    pub fn harder(self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium | Self::Hard => Self::Hard,
        }
    }

    /// One tier down, staying at `Easy` when already there.
    #[must_use]
    pub fn easier(self) -> Self {
        match self {
            Self::Easy | Self::Medium => Self::Easy,
            Self::Hard => Self::Medium,
        }
    }

    /// Other tiers ordered by distance from `self`, lower tier first on ties.
    #[must_use]
    pub fn fallbacks(self) -> [DifficultyTier; 2] {
        match self {
            Self::Easy => [Self::Medium, Self::Hard],
            Self::Medium => [Self::Easy, Self::Hard],
            Self::Hard => [Self::Medium, Self::Easy],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            _ => Err(ParseEnumError::new("difficulty tier", s)),
        }
    }
}
