//! The Exercise Bank: the single read path over the curated catalog.

mod catalog;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use assess_core::model::{DifficultyTier, ExerciseId, ExerciseItem, SessionId, SubjectId, Topic};
use storage::repository::{ExerciseRepository, SessionRepository, StorageError};

pub use catalog::Catalog;

/// One `select` request.
#[derive(Debug, Clone)]
pub struct SelectionQuery<'a> {
    pub topic: Topic,
    pub tier: DifficultyTier,
    pub count: usize,
    /// Ids already asked in the requesting session. Never returned.
    pub exclude_ids: &'a [ExerciseId],
    pub subject_id: &'a SubjectId,
    /// The requesting session; its own questions do not count as "recent".
    pub session_id: SessionId,
    pub avoid_repetition: bool,
}

/// Selects diverse, non-repeating exercises by topic and tier.
///
/// Items the subject saw in its last `recency_sessions` sessions are pushed
/// behind unseen ones and only used when the unseen pool is too small.
pub struct ExerciseBank {
    exercises: Arc<dyn ExerciseRepository>,
    sessions: Arc<dyn SessionRepository>,
    recency_sessions: u32,
    rng: Mutex<StdRng>,
}

impl ExerciseBank {
    #[must_use]
    pub fn new(
        exercises: Arc<dyn ExerciseRepository>,
        sessions: Arc<dyn SessionRepository>,
        recency_sessions: u32,
    ) -> Self {
        Self {
            exercises,
            sessions,
            recency_sessions,
            rng: Mutex::new(StdRng::from_rng(&mut rand::rng())),
        }
    }

    /// Makes selection order reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Returns at most `query.count` items matching topic and tier.
    ///
    /// A short or empty list means the catalog is exhausted for the filter;
    /// that is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only when the backing store fails.
    pub async fn select(
        &self,
        query: &SelectionQuery<'_>,
    ) -> Result<Vec<ExerciseItem>, StorageError> {
        if query.count == 0 {
            return Ok(Vec::new());
        }

        let excluded: HashSet<ExerciseId> = query.exclude_ids.iter().copied().collect();
        let mut pool = self
            .exercises
            .exercises_matching(query.topic, query.tier)
            .await?;
        pool.retain(|item| !excluded.contains(&item.id()));

        if pool.is_empty() {
            debug!(topic = %query.topic, tier = %query.tier, "no unseen exercises left");
            return Ok(pool);
        }

        let recent: HashSet<ExerciseId> = if query.avoid_repetition && self.recency_sessions > 0 {
            self.sessions
                .recent_exercise_ids(query.subject_id, query.session_id, self.recency_sessions)
                .await?
                .into_iter()
                .collect()
        } else {
            HashSet::new()
        };

        let (mut fresh, mut seen): (Vec<ExerciseItem>, Vec<ExerciseItem>) =
            pool.into_iter().partition(|item| !recent.contains(&item.id()));

        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            fresh.shuffle(&mut *rng);
            seen.shuffle(&mut *rng);
        }

        if fresh.len() < query.count && !seen.is_empty() {
            warn!(
                subject = %query.subject_id,
                topic = %query.topic,
                tier = %query.tier,
                fresh = fresh.len(),
                wanted = query.count,
                "allowing recently seen exercises"
            );
        }

        let mut selected = fresh;
        selected.extend(seen);
        selected.truncate(query.count);

        debug!(
            topic = %query.topic,
            tier = %query.tier,
            selected = selected.len(),
            "exercise selection"
        );
        Ok(selected)
    }

    /// Looks up one catalog entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing id is `Ok(None)`.
    pub async fn get(&self, id: ExerciseId) -> Result<Option<ExerciseItem>, StorageError> {
        self.exercises.get_exercise(id).await
    }

    /// Number of exercises in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    pub async fn catalog_size(&self) -> Result<u64, StorageError> {
        self.exercises.count_exercises().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{AssessmentKind, ExerciseDraft, ExerciseKind, SessionRecord};
    use assess_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn item(id: u64, topic: Topic, tier: DifficultyTier) -> ExerciseItem {
        ExerciseDraft {
            id: ExerciseId::new(id),
            topic,
            tier,
            kind: ExerciseKind::OpenResponse,
            prompt: format!("Q{id}"),
            expected_answer: format!("A{id}"),
            options: Vec::new(),
            explanation: None,
        }
        .validate()
        .unwrap()
    }

    async fn bank_with(items: &[ExerciseItem]) -> (ExerciseBank, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        for i in items {
            repo.upsert_exercise(i).await.unwrap();
        }
        let bank = ExerciseBank::new(Arc::new(repo.clone()), Arc::new(repo.clone()), 3).with_seed(7);
        (bank, repo)
    }

    fn query<'a>(
        topic: Topic,
        tier: DifficultyTier,
        count: usize,
        exclude_ids: &'a [ExerciseId],
        subject_id: &'a SubjectId,
    ) -> SelectionQuery<'a> {
        SelectionQuery {
            topic,
            tier,
            count,
            exclude_ids,
            subject_id,
            session_id: SessionId::generate(),
            avoid_repetition: true,
        }
    }

    #[tokio::test]
    async fn short_pool_returns_what_exists() {
        let (bank, _) = bank_with(&[
            item(1, Topic::Grammar, DifficultyTier::Hard),
            item(2, Topic::Grammar, DifficultyTier::Hard),
            item(3, Topic::Grammar, DifficultyTier::Easy),
            item(4, Topic::Vocabulary, DifficultyTier::Hard),
        ])
        .await;
        let subject = SubjectId::new("ana").unwrap();

        let mut ids: Vec<u64> = bank
            .select(&query(Topic::Grammar, DifficultyTier::Hard, 5, &[], &subject))
            .await
            .unwrap()
            .iter()
            .map(|e| e.id().value())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn excluded_ids_are_never_returned() {
        let (bank, _) = bank_with(&[
            item(1, Topic::Grammar, DifficultyTier::Easy),
            item(2, Topic::Grammar, DifficultyTier::Easy),
        ])
        .await;
        let subject = SubjectId::new("ana").unwrap();
        let exclude = [ExerciseId::new(1), ExerciseId::new(2)];

        let picked = bank
            .select(&query(Topic::Grammar, DifficultyTier::Easy, 3, &exclude, &subject))
            .await
            .unwrap();
        assert!(picked.is_empty());
    }

    #[tokio::test]
    async fn recently_seen_items_come_last() {
        let (bank, repo) = bank_with(&[
            item(1, Topic::Grammar, DifficultyTier::Easy),
            item(2, Topic::Grammar, DifficultyTier::Easy),
            item(3, Topic::Grammar, DifficultyTier::Easy),
        ])
        .await;
        let subject = SubjectId::new("ana").unwrap();

        let mut prior = SessionRecord::start(
            SessionId::generate(),
            subject.clone(),
            AssessmentKind::Practice,
            &[Topic::Grammar],
            1,
            ExerciseId::new(1),
            DifficultyTier::Easy,
            fixed_now(),
        )
        .unwrap();
        repo.insert_session(&prior).await.unwrap();
        let v = prior.version();
        prior.abandon(fixed_now()).unwrap();
        repo.update_session(&prior, v).await.unwrap();

        for _ in 0..10 {
            let two = bank
                .select(&query(Topic::Grammar, DifficultyTier::Easy, 2, &[], &subject))
                .await
                .unwrap();
            assert!(two.iter().all(|e| e.id() != ExerciseId::new(1)));
        }

        // Asking for more than the unseen pool falls back to the repeat.
        let all = bank
            .select(&query(Topic::Grammar, DifficultyTier::Easy, 3, &[], &subject))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id(), ExerciseId::new(1));

        // Another subject is unaffected by ana's history.
        let ben = SubjectId::new("ben").unwrap();
        let mut q = query(Topic::Grammar, DifficultyTier::Easy, 3, &[], &ben);
        q.avoid_repetition = false;
        assert_eq!(bank.select(&q).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn same_seed_gives_same_order() {
        let items: Vec<ExerciseItem> = (1..=8)
            .map(|i| item(i, Topic::Vocabulary, DifficultyTier::Medium))
            .collect();
        let (a, _) = bank_with(&items).await;
        let (b, _) = bank_with(&items).await;
        let subject = SubjectId::new("ana").unwrap();
        let q = query(Topic::Vocabulary, DifficultyTier::Medium, 8, &[], &subject);

        let ids = |v: Vec<ExerciseItem>| v.iter().map(ExerciseItem::id).collect::<Vec<_>>();
        assert_eq!(
            ids(a.select(&q).await.unwrap()),
            ids(b.select(&q).await.unwrap())
        );
    }
}
