use tracing::{debug, warn};

use assess_core::model::{DifficultyTier, ExerciseId, ExerciseItem, SessionId, SubjectId, Topic};
use storage::repository::StorageError;

use crate::bank::{ExerciseBank, SelectionQuery};

/// Everything needed to choose the question at `position`.
pub(super) struct PickRequest<'a> {
    pub session_id: SessionId,
    pub subject_id: &'a SubjectId,
    pub topics: &'a [Topic],
    pub position: u32,
    pub tier: DifficultyTier,
    pub asked: &'a [ExerciseId],
    pub avoid_repetition: bool,
}

/// Picks one unseen exercise, widening the search when the preferred slot is empty.
///
/// Topics rotate from `topics[position % len]`; every topic is tried at the
/// target tier before the nearest other tiers (lower first) are tried.
/// `None` means nothing unseen is left anywhere in the catalog.
pub(super) async fn pick_next(
    bank: &ExerciseBank,
    req: &PickRequest<'_>,
) -> Result<Option<ExerciseItem>, StorageError> {
    let len = req.topics.len();
    if len == 0 {
        return Ok(None);
    }
    let start = req.position as usize % len;
    let preferred = req.topics[start];

    let tiers = std::iter::once(req.tier).chain(req.tier.fallbacks());
    for tier in tiers {
        for offset in 0..len {
            let topic = req.topics[(start + offset) % len];
            let query = SelectionQuery {
                topic,
                tier,
                count: 1,
                exclude_ids: req.asked,
                subject_id: req.subject_id,
                session_id: req.session_id,
                avoid_repetition: req.avoid_repetition,
            };
            if let Some(item) = bank.select(&query).await?.into_iter().next() {
                if topic != preferred || tier != req.tier {
                    warn!(
                        session = %req.session_id,
                        wanted_topic = %preferred,
                        wanted_tier = %req.tier,
                        topic = %topic,
                        tier = %tier,
                        "preferred slot exhausted, serving fallback"
                    );
                } else {
                    debug!(session = %req.session_id, exercise = %item.id(), "picked exercise");
                }
                return Ok(Some(item));
            }
        }
    }

    Ok(None)
}
