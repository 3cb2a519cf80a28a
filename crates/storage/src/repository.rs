use assess_core::model::{
    AssessmentKind, DifficultyTier, ExerciseId, ExerciseItem, ResponseRecord, ResultProfile,
    SessionId, SessionRecord, SessionStatus, SubjectId, Topic,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read path over the curated exercise catalog.
#[async_trait]
pub trait ExerciseRepository: Send + Sync {
    /// Insert or replace a catalog entry. Used by curation tooling only.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn upsert_exercise(&self, item: &ExerciseItem) -> Result<(), StorageError>;

    /// Fetch a single exercise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing id is `Ok(None)`.
    async fn get_exercise(&self, id: ExerciseId) -> Result<Option<ExerciseItem>, StorageError>;

    /// Every exercise with the given topic and tier, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn exercises_matching(
        &self,
        topic: Topic,
        tier: DifficultyTier,
    ) -> Result<Vec<ExerciseItem>, StorageError>;

    /// Number of exercises in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_exercises(&self) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a freshly started session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id exists or the subject already
    /// has an in-progress session of the same kind.
    async fn insert_session(&self, session: &SessionRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing id is `Ok(None)`.
    async fn get_session(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError>;

    /// The in-progress session for `(subject, kind)`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_in_progress(
        &self,
        subject: &SubjectId,
        kind: AssessmentKind,
    ) -> Result<Option<SessionRecord>, StorageError>;

    /// Replace a session if the stored version still equals `expected_version`.
    ///
    /// The stored question sequence must be a prefix of the new one.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if the session does not exist
    /// - `StorageError::Conflict` on a version mismatch or a rewritten sequence
    async fn update_session(
        &self,
        session: &SessionRecord,
        expected_version: u64,
    ) -> Result<(), StorageError>;

    /// Sessions of a subject, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions(
        &self,
        subject: &SubjectId,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError>;

    /// Exercise ids asked in the subject's `sessions` most recent sessions,
    /// not counting `exclude`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn recent_exercise_ids(
        &self,
        subject: &SubjectId,
        exclude: SessionId,
        sessions: u32,
    ) -> Result<Vec<ExerciseId>, StorageError>;

    /// Delete a session with its responses and result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn purge_session(&self, id: SessionId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Responses of a session in submission order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn responses_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<ResponseRecord>, StorageError>;
}

/// Atomic write of one answered question.
#[async_trait]
pub trait AnswerPersistence: Send + Sync {
    /// Append `response` and replace the session in one step, guarded by
    /// `expected_version`. Either both writes happen or neither does.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if the session does not exist
    /// - `StorageError::Conflict` on a version mismatch, a response for another
    ///   session, or a second response for the same exercise
    async fn record_answer(
        &self,
        session: &SessionRecord,
        expected_version: u64,
        response: &ResponseRecord,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Store the profile of a completed session. Profiles are write-once.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a profile already exists for the session.
    async fn insert_result(&self, profile: &ResultProfile) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing profile is `Ok(None)`.
    async fn get_result(&self, session: SessionId) -> Result<Option<ResultProfile>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Locks are always taken in the order sessions, responses, results.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    exercises: Arc<Mutex<BTreeMap<ExerciseId, ExerciseItem>>>,
    sessions: Arc<Mutex<HashMap<SessionId, SessionRecord>>>,
    responses: Arc<Mutex<HashMap<SessionId, Vec<ResponseRecord>>>>,
    results: Arc<Mutex<HashMap<SessionId, ResultProfile>>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|e| StorageError::Connection(e.to_string()))
}

/// Version and append-only checks shared by every session write.
fn check_replace(
    stored: &SessionRecord,
    next: &SessionRecord,
    expected_version: u64,
) -> Result<(), StorageError> {
    if stored.version() != expected_version {
        return Err(StorageError::Conflict);
    }
    if !next
        .question_sequence()
        .starts_with(stored.question_sequence())
    {
        return Err(StorageError::Conflict);
    }
    Ok(())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExerciseRepository for InMemoryRepository {
    async fn upsert_exercise(&self, item: &ExerciseItem) -> Result<(), StorageError> {
        lock(&self.exercises)?.insert(item.id(), item.clone());
        Ok(())
    }

    async fn get_exercise(&self, id: ExerciseId) -> Result<Option<ExerciseItem>, StorageError> {
        Ok(lock(&self.exercises)?.get(&id).cloned())
    }

    async fn exercises_matching(
        &self,
        topic: Topic,
        tier: DifficultyTier,
    ) -> Result<Vec<ExerciseItem>, StorageError> {
        Ok(lock(&self.exercises)?
            .values()
            .filter(|e| e.topic() == topic && e.tier() == tier)
            .cloned()
            .collect())
    }

    async fn count_exercises(&self) -> Result<u64, StorageError> {
        Ok(lock(&self.exercises)?.len() as u64)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        if guard.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        let active_exists = session.status() == SessionStatus::InProgress
            && guard.values().any(|s| {
                s.status() == SessionStatus::InProgress
                    && s.subject_id() == session.subject_id()
                    && s.kind() == session.kind()
            });
        if active_exists {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError> {
        Ok(lock(&self.sessions)?.get(&id).cloned())
    }

    async fn find_in_progress(
        &self,
        subject: &SubjectId,
        kind: AssessmentKind,
    ) -> Result<Option<SessionRecord>, StorageError> {
        Ok(lock(&self.sessions)?
            .values()
            .find(|s| {
                s.status() == SessionStatus::InProgress
                    && s.subject_id() == subject
                    && s.kind() == kind
            })
            .cloned())
    }

    async fn update_session(
        &self,
        session: &SessionRecord,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        let stored = guard.get(&session.id()).ok_or(StorageError::NotFound)?;
        check_replace(stored, session, expected_version)?;
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn list_sessions(
        &self,
        subject: &SubjectId,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let guard = lock(&self.sessions)?;
        let mut out: Vec<SessionRecord> = guard
            .values()
            .filter(|s| s.subject_id() == subject)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.started_at()
                .cmp(&a.started_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }

    async fn recent_exercise_ids(
        &self,
        subject: &SubjectId,
        exclude: SessionId,
        sessions: u32,
    ) -> Result<Vec<ExerciseId>, StorageError> {
        let recent = self.list_sessions(subject, u32::MAX).await?;
        Ok(recent
            .into_iter()
            .filter(|s| s.id() != exclude)
            .take(usize::try_from(sessions).unwrap_or(usize::MAX))
            .flat_map(|s| s.question_sequence().to_vec())
            .collect())
    }

    async fn purge_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut sessions = lock(&self.sessions)?;
        let mut responses = lock(&self.responses)?;
        let mut results = lock(&self.results)?;
        sessions.remove(&id).ok_or(StorageError::NotFound)?;
        responses.remove(&id);
        results.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ResponseRepository for InMemoryRepository {
    async fn responses_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<ResponseRecord>, StorageError> {
        let mut out = lock(&self.responses)?.get(&id).cloned().unwrap_or_default();
        out.sort_by_key(|r| r.position);
        Ok(out)
    }
}

#[async_trait]
impl AnswerPersistence for InMemoryRepository {
    async fn record_answer(
        &self,
        session: &SessionRecord,
        expected_version: u64,
        response: &ResponseRecord,
    ) -> Result<(), StorageError> {
        if response.session_id != session.id() {
            return Err(StorageError::Conflict);
        }

        let mut sessions = lock(&self.sessions)?;
        let mut responses = lock(&self.responses)?;

        let stored = sessions.get(&session.id()).ok_or(StorageError::NotFound)?;
        check_replace(stored, session, expected_version)?;

        let answered = responses.entry(session.id()).or_default();
        if answered
            .iter()
            .any(|r| r.exercise_id == response.exercise_id || r.position == response.position)
        {
            return Err(StorageError::Conflict);
        }

        answered.push(response.clone());
        sessions.insert(session.id(), session.clone());
        Ok(())
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn insert_result(&self, profile: &ResultProfile) -> Result<(), StorageError> {
        let sessions = lock(&self.sessions)?;
        if !sessions.contains_key(&profile.session_id()) {
            return Err(StorageError::NotFound);
        }
        let mut results = lock(&self.results)?;
        if results.contains_key(&profile.session_id()) {
            return Err(StorageError::Conflict);
        }
        results.insert(profile.session_id(), profile.clone());
        Ok(())
    }

    async fn get_result(&self, session: SessionId) -> Result<Option<ResultProfile>, StorageError> {
        Ok(lock(&self.results)?.get(&session).cloned())
    }
}

//
// ─── STORAGE ───────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub exercises: Arc<dyn ExerciseRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub answers: Arc<dyn AnswerPersistence>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Uses one repository value for every role.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ExerciseRepository
            + SessionRepository
            + ResponseRepository
            + AnswerPersistence
            + ResultRepository
            + Clone
            + 'static,
    {
        Self {
            exercises: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            responses: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            results: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{Advance, ExerciseDraft, ExerciseKind, ScoringThresholds};
    use assess_core::time::fixed_now;
    use chrono::Duration;

    fn exercise(id: u64, topic: Topic, tier: DifficultyTier) -> ExerciseItem {
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

    fn subject(name: &str) -> SubjectId {
        SubjectId::new(name).unwrap()
    }

    fn session(who: &str, first: u64, total: u32) -> SessionRecord {
        SessionRecord::start(
            SessionId::generate(),
            subject(who),
            AssessmentKind::Placement,
            &[Topic::Grammar],
            total,
            ExerciseId::new(first),
            DifficultyTier::Easy,
            fixed_now(),
        )
        .unwrap()
    }

    fn response_for(s: &SessionRecord, correct: bool) -> ResponseRecord {
        ResponseRecord {
            session_id: s.id(),
            exercise_id: s.current_exercise().unwrap(),
            position: s.current_index(),
            topic: Topic::Grammar,
            submitted_answer: "A".into(),
            is_correct: correct,
            difficulty_at_time: s.current_difficulty(),
            response_latency_ms: Some(1200),
            answered_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn filters_exercises_by_topic_and_tier() {
        let repo = InMemoryRepository::new();
        repo.upsert_exercise(&exercise(1, Topic::Grammar, DifficultyTier::Hard))
            .await
            .unwrap();
        repo.upsert_exercise(&exercise(2, Topic::Grammar, DifficultyTier::Easy))
            .await
            .unwrap();
        repo.upsert_exercise(&exercise(3, Topic::Vocabulary, DifficultyTier::Hard))
            .await
            .unwrap();

        let hard_grammar = repo
            .exercises_matching(Topic::Grammar, DifficultyTier::Hard)
            .await
            .unwrap();
        assert_eq!(hard_grammar.len(), 1);
        assert_eq!(hard_grammar[0].id(), ExerciseId::new(1));
        assert_eq!(repo.count_exercises().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn second_active_session_for_same_kind_conflicts() {
        let repo = InMemoryRepository::new();
        let first = session("ana", 1, 3);
        repo.insert_session(&first).await.unwrap();

        let err = repo.insert_session(&session("ana", 2, 3)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        repo.insert_session(&session("ben", 2, 3)).await.unwrap();

        let mut abandoned = first.clone();
        abandoned.abandon(fixed_now()).unwrap();
        repo.update_session(&abandoned, first.version()).await.unwrap();
        repo.insert_session(&session("ana", 3, 3)).await.unwrap();
    }

    #[tokio::test]
    async fn record_answer_is_version_guarded() {
        let repo = InMemoryRepository::new();
        let s = session("ana", 1, 3);
        repo.insert_session(&s).await.unwrap();

        let response = response_for(&s, true);
        let mut next = s.clone();
        next.advance(
            Advance::Next {
                exercise: ExerciseId::new(2),
                tier: DifficultyTier::Medium,
            },
            fixed_now(),
        )
        .unwrap();

        repo.record_answer(&next, s.version(), &response).await.unwrap();
        let err = repo
            .record_answer(&next, s.version(), &response)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let stored = repo.get_session(s.id()).await.unwrap().unwrap();
        assert_eq!(stored.version(), next.version());
        assert_eq!(repo.responses_for_session(s.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sequence_cannot_be_rewritten() {
        let repo = InMemoryRepository::new();
        let s = session("ana", 1, 3);
        repo.insert_session(&s).await.unwrap();

        let rewritten = session("ana", 9, 3);
        let forged = SessionRecord::from_persisted(assess_core::model::PersistedSession {
            id: s.id(),
            subject_id: s.subject_id().clone(),
            kind: s.kind(),
            status: s.status(),
            current_difficulty: s.current_difficulty(),
            current_index: 0,
            question_sequence: rewritten.question_sequence().to_vec(),
            topics: s.topics().to_vec(),
            total_questions: 3,
            started_at: s.started_at(),
            completed_at: None,
            version: s.version() + 1,
        })
        .unwrap();
        let err = repo.update_session(&forged, s.version()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn recent_ids_cover_prior_sessions_only() {
        let repo = InMemoryRepository::new();
        let mut old = session("ana", 10, 1);
        repo.insert_session(&old).await.unwrap();
        let v = old.version();
        old.advance(Advance::Complete, fixed_now()).unwrap();
        repo.update_session(&old, v).await.unwrap();

        let current = SessionRecord::start(
            SessionId::generate(),
            subject("ana"),
            AssessmentKind::Placement,
            &[Topic::Grammar],
            3,
            ExerciseId::new(20),
            DifficultyTier::Easy,
            fixed_now() + Duration::hours(1),
        )
        .unwrap();
        repo.insert_session(&current).await.unwrap();

        let ids = repo
            .recent_exercise_ids(&subject("ana"), current.id(), 3)
            .await
            .unwrap();
        assert_eq!(ids, vec![ExerciseId::new(10)]);

        let listed = repo.list_sessions(&subject("ana"), 10).await.unwrap();
        assert_eq!(listed[0].id(), current.id());
    }

    #[tokio::test]
    async fn results_are_write_once_and_purged_with_session() {
        let repo = InMemoryRepository::new();
        let mut s = session("ana", 1, 1);
        repo.insert_session(&s).await.unwrap();
        let response = response_for(&s, true);
        let v = s.version();
        s.advance(Advance::Complete, fixed_now()).unwrap();
        repo.record_answer(&s, v, &response).await.unwrap();

        let profile = ResultProfile::from_responses(
            &s,
            &[response],
            &ScoringThresholds::default(),
            fixed_now(),
        )
        .unwrap();
        repo.insert_result(&profile).await.unwrap();
        assert!(matches!(
            repo.insert_result(&profile).await.unwrap_err(),
            StorageError::Conflict
        ));
        assert_eq!(repo.get_result(s.id()).await.unwrap(), Some(profile));

        repo.purge_session(s.id()).await.unwrap();
        assert!(repo.get_session(s.id()).await.unwrap().is_none());
        assert!(repo.get_result(s.id()).await.unwrap().is_none());
        assert!(repo.responses_for_session(s.id()).await.unwrap().is_empty());
    }
}
