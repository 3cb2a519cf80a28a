use serde::{Deserialize, Serialize};

use assess_core::model::{DifficultyTier, ScoringThresholds};
use assess_core::policy::DifficultyPolicy;

use crate::error::ConfigError;

/// Engine settings. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Used when `start` is called without a target length.
    pub default_total_questions: u32,
    pub max_total_questions: u32,
    pub starting_tier: DifficultyTier,
    pub avoid_repetition: bool,
    /// How many prior sessions count as "recent" for repetition avoidance.
    pub recency_sessions: u32,
    pub policy: PolicyConfig,
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_total_questions: 10,
            max_total_questions: 100,
            starting_tier: DifficultyTier::Easy,
            avoid_repetition: true,
            recency_sessions: 3,
            policy: PolicyConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub window: usize,
    pub advance_threshold: f64,
    pub retreat_threshold: f64,
    pub min_answers_at_tier: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let policy = DifficultyPolicy::default();
        Self {
            window: policy.window(),
            advance_threshold: policy.advance_threshold(),
            retreat_threshold: policy.retreat_threshold(),
            min_answers_at_tier: policy.min_answers_at_tier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub strength_threshold: f64,
    pub weakness_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let thresholds = ScoringThresholds::default();
        Self {
            strength_threshold: thresholds.strength(),
            weakness_threshold: thresholds.weakness(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the document is malformed or a value is out of range.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` on the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_total_questions == 0 {
            return Err(ConfigError::ZeroMaxTotal);
        }
        if self.default_total_questions == 0
            || self.default_total_questions > self.max_total_questions
        {
            return Err(ConfigError::InvalidDefaultTotal {
                default: self.default_total_questions,
                max: self.max_total_questions,
            });
        }
        self.policy()?;
        self.thresholds()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Policy` if the thresholds do not leave a hold band.
    pub fn policy(&self) -> Result<DifficultyPolicy, ConfigError> {
        Ok(DifficultyPolicy::new(
            self.policy.window,
            self.policy.advance_threshold,
            self.policy.retreat_threshold,
            self.policy.min_answers_at_tier,
        )?)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Scoring` unless `0 <= weakness < strength <= 1`.
    pub fn thresholds(&self) -> Result<ScoringThresholds, ConfigError> {
        Ok(ScoringThresholds::new(
            self.scoring.strength_threshold,
            self.scoring.weakness_threshold,
        )?)
    }
}
