use serde::Serialize;
use thiserror::Error;

use crate::model::{DifficultyTier, Outcome};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("window must be > 0")]
    EmptyWindow,

    #[error("thresholds must be in [0, 1], got advance={advance} retreat={retreat}")]
    OutOfRange { advance: f64, retreat: f64 },

    #[error("thresholds must straddle 0.5 with a gap (retreat < 0.5 < advance), got advance={advance} retreat={retreat}")]
    NoHysteresisGap { advance: f64, retreat: f64 },
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Chooses the tier of the next question from the answers so far.
///
/// The decision uses the rolling correctness ratio of the last `window`
/// answers. At or above `advance_threshold` the tier moves up one step, at or
/// below `retreat_threshold` it moves down one step, anything in between
/// holds. Because `retreat < 0.5 < advance`, a learner alternating right and
/// wrong sits in the hold band and does not bounce between two tiers.
///
/// After a transition the new tier is held until `min_answers_at_tier`
/// answers have been given at it. The opening tier is exempt so placement can
/// move away from a bad starting guess after the first answer.
///
/// # Examples
///
/// ```
/// # use assess_core::policy::DifficultyPolicy;
/// # use assess_core::model::{DifficultyTier, Outcome};
/// let policy = DifficultyPolicy::default();
/// let history = [Outcome::new(DifficultyTier::Easy, true)];
/// assert_eq!(policy.next_difficulty(DifficultyTier::Easy, &history), DifficultyTier::Medium);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifficultyPolicy {
    window: usize,
    advance_threshold: f64,
    retreat_threshold: f64,
    min_answers_at_tier: usize,
}

impl Default for DifficultyPolicy {
    fn default() -> Self {
        Self {
            window: 4,
            advance_threshold: 0.75,
            retreat_threshold: 0.40,
            min_answers_at_tier: 2,
        }
    }
}

impl DifficultyPolicy {
    /// # Errors
    ///
    /// - `EmptyWindow` if `window` is zero
    /// - `OutOfRange` if a threshold is outside `[0, 1]`
    /// - `NoHysteresisGap` unless `retreat < 0.5 < advance`
    pub fn new(
        window: usize,
        advance_threshold: f64,
        retreat_threshold: f64,
        min_answers_at_tier: usize,
    ) -> Result<Self, PolicyError> {
        if window == 0 {
            return Err(PolicyError::EmptyWindow);
        }
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(advance_threshold) || !in_range(retreat_threshold) {
            return Err(PolicyError::OutOfRange {
                advance: advance_threshold,
                retreat: retreat_threshold,
            });
        }
        if !(retreat_threshold < 0.5 && 0.5 < advance_threshold) {
            return Err(PolicyError::NoHysteresisGap {
                advance: advance_threshold,
                retreat: retreat_threshold,
            });
        }
        Ok(Self {
            window,
            advance_threshold,
            retreat_threshold,
            min_answers_at_tier,
        })
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    #[must_use]
    pub fn advance_threshold(&self) -> f64 {
        self.advance_threshold
    }

    #[must_use]
    pub fn retreat_threshold(&self) -> f64 {
        self.retreat_threshold
    }

    #[must_use]
    pub fn min_answers_at_tier(&self) -> usize {
        self.min_answers_at_tier
    }

    /// Tier for the next question. `history` is every answer so far, oldest first.
    #[must_use]
    pub fn next_difficulty(&self, current: DifficultyTier, history: &[Outcome]) -> DifficultyTier {
        if history.is_empty() {
            return current;
        }

        let at_current = history
            .iter()
            .rev()
            .take_while(|o| o.tier == current)
            .count();
        let moved_here = at_current < history.len();
        if moved_here && at_current < self.min_answers_at_tier {
            return current;
        }

        let ratio = self.rolling_ratio(history);
        if ratio >= self.advance_threshold {
            current.harder()
        } else if ratio <= self.retreat_threshold {
            current.easier()
        } else {
            current
        }
    }

    /// Fraction correct over the last `window` outcomes.
    #[must_use]
    pub fn rolling_ratio(&self, history: &[Outcome]) -> f64 {
        let start = history.len().saturating_sub(self.window);
        let recent = &history[start..];
        if recent.is_empty() {
            return 0.0;
        }
        let correct = recent.iter().filter(|o| o.correct).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = correct as f64 / recent.len() as f64;
        ratio
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
