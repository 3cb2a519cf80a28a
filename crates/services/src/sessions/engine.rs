use std::sync::Arc;

use tracing::{debug, info, warn};

use assess_core::Clock;
use assess_core::model::{
    Advance, AssessmentKind, DifficultyTier, ExerciseId, ExerciseItem, Outcome, ResponseRecord,
    ResultProfile, SessionId, SessionRecord, SessionStatus, SubjectId, Topic,
};
use assess_core::policy::DifficultyPolicy;
use storage::repository::{
    AnswerPersistence, ExerciseRepository, ResponseRepository, SessionRepository, Storage,
    StorageError,
};

use super::finalizer::Finalizer;
use super::picker::{PickRequest, pick_next};
use super::view::{Answer, CurrentQuestion, GradedAnswer, QuestionView, SessionSnapshot, SubmitOutcome};
use crate::bank::ExerciseBank;
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineInitError, SessionError};

/// Drives assessment sessions from start to result.
///
/// Every state change goes through [`SessionRecord`] and is persisted with a
/// version check, so two racing submissions for the same question cannot both
/// land.
#[derive(Clone)]
pub struct AssessmentEngine {
    clock: Clock,
    config: EngineConfig,
    policy: DifficultyPolicy,
    bank: Arc<ExerciseBank>,
    exercises: Arc<dyn ExerciseRepository>,
    sessions: Arc<dyn SessionRepository>,
    responses: Arc<dyn ResponseRepository>,
    answers: Arc<dyn AnswerPersistence>,
    finalizer: Finalizer,
}

impl AssessmentEngine {
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` does not validate.
    pub fn new(storage: &Storage, config: EngineConfig, clock: Clock) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.policy()?;
        let finalizer = Finalizer::new(
            clock,
            config.thresholds()?,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.responses),
            Arc::clone(&storage.results),
        );
        let bank = ExerciseBank::new(
            Arc::clone(&storage.exercises),
            Arc::clone(&storage.sessions),
            config.recency_sessions,
        );

        Ok(Self {
            clock,
            config,
            policy,
            bank: Arc::new(bank),
            exercises: Arc::clone(&storage.exercises),
            sessions: Arc::clone(&storage.sessions),
            responses: Arc::clone(&storage.responses),
            answers: Arc::clone(&storage.answers),
            finalizer,
        })
    }

    /// Build an engine backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if storage initialization or config validation fails.
    pub async fn new_sqlite(
        db_url: &str,
        config: EngineConfig,
        clock: Clock,
    ) -> Result<Self, EngineInitError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, config, clock)?)
    }

    /// Fixes the bank's shuffle seed so question order is reproducible.
    #[must_use]
    pub fn with_selection_seed(mut self, seed: u64) -> Self {
        let bank = ExerciseBank::new(
            Arc::clone(&self.exercises),
            Arc::clone(&self.sessions),
            self.config.recency_sessions,
        )
        .with_seed(seed);
        self.bank = Arc::new(bank);
        self
    }

    #[must_use]
    pub fn bank(&self) -> &ExerciseBank {
        &self.bank
    }

    #[must_use]
    pub fn finalizer(&self) -> &Finalizer {
        &self.finalizer
    }

    /// Opens a session and picks its first question.
    ///
    /// `total_questions` defaults to the configured value; an empty `topics`
    /// list means every topic.
    ///
    /// # Errors
    ///
    /// - `InvalidTotalQuestions` for a zero or oversized target
    /// - `ActiveSessionExists` if `(subject, kind)` already has a running session
    /// - `NoExercisesAvailable` if the catalog has nothing to ask
    pub async fn start(
        &self,
        subject: &SubjectId,
        kind: AssessmentKind,
        total_questions: Option<u32>,
        topics: &[Topic],
    ) -> Result<CurrentQuestion, SessionError> {
        let total = self.resolve_total(total_questions)?;
        let topics: Vec<Topic> = if topics.is_empty() {
            Topic::ALL.to_vec()
        } else {
            topics.to_vec()
        };

        if let Some(active) = self.sessions.find_in_progress(subject, kind).await? {
            debug!(subject = %subject, session = %active.id(), "start refused, session in progress");
            return Err(SessionError::ActiveSessionExists {
                subject: subject.clone(),
                kind,
            });
        }

        let id = SessionId::generate();
        let first = pick_next(
            &self.bank,
            &PickRequest {
                session_id: id,
                subject_id: subject,
                topics: &topics,
                position: 0,
                tier: self.config.starting_tier,
                asked: &[],
                avoid_repetition: self.config.avoid_repetition,
            },
        )
        .await?
        .ok_or(SessionError::NoExercisesAvailable)?;

        let session = SessionRecord::start(
            id,
            subject.clone(),
            kind,
            &topics,
            total,
            first.id(),
            first.tier(),
            self.clock.now(),
        )?;

        match self.sessions.insert_session(&session).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                return Err(SessionError::ActiveSessionExists {
                    subject: subject.clone(),
                    kind,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            session = %id,
            subject = %subject,
            kind = %kind,
            total,
            tier = %first.tier(),
            "session started"
        );

        Ok(CurrentQuestion {
            session: SessionSnapshot::from(&session),
            question: Some(QuestionView::new(&first, 0)),
        })
    }

    /// Read-only view of the session and its pending question.
    ///
    /// Safe to call any number of times; never re-picks a question.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` / `Forbidden` for unknown or foreign sessions
    /// - `ExerciseNotFound` if the pending exercise left the catalog
    pub async fn resume(
        &self,
        session_id: SessionId,
        subject: &SubjectId,
    ) -> Result<CurrentQuestion, SessionError> {
        let session = self.load_owned(session_id, subject).await?;
        let question = match session.current_exercise() {
            Some(exercise) => {
                let item = self.exercise(exercise).await?;
                Some(QuestionView::new(&item, session.current_index()))
            }
            None => None,
        };
        Ok(CurrentQuestion {
            session: SessionSnapshot::from(&session),
            question,
        })
    }

    /// The question waiting for an answer.
    ///
    /// # Errors
    ///
    /// As [`AssessmentEngine::resume`], plus `InvalidState` once the session is terminal.
    pub async fn current_question(
        &self,
        session_id: SessionId,
        subject: &SubjectId,
    ) -> Result<QuestionView, SessionError> {
        let current = self.resume(session_id, subject).await?;
        current.question.ok_or(SessionError::InvalidState {
            session: session_id,
            status: current.session.status,
        })
    }

    /// Grades `answer` against the current question and moves the session on.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound`, `Forbidden`, `InvalidState` per session checks
    /// - `StaleAnswer` if `answer` names an exercise that is not current
    /// - `VersionConflict` if another submission won the race
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        subject: &SubjectId,
        answer: Answer,
    ) -> Result<SubmitOutcome, SessionError> {
        let mut session = self.load_owned(session_id, subject).await?;
        let Some(current) = session.current_exercise() else {
            return Err(SessionError::InvalidState {
                session: session_id,
                status: session.status(),
            });
        };
        if let Some(submitted) = answer.exercise_id {
            if submitted != current {
                return Err(SessionError::StaleAnswer { current, submitted });
            }
        }

        let item = self.exercise(current).await?;
        let now = self.clock.now();
        let position = session.current_index();
        let tier_at_time = session.current_difficulty();
        let is_correct = item.grade(&answer.text);

        let response = ResponseRecord {
            session_id,
            exercise_id: current,
            position,
            topic: item.topic(),
            submitted_answer: answer.text,
            is_correct,
            difficulty_at_time: tier_at_time,
            response_latency_ms: answer.latency_ms,
            answered_at: now,
        };

        let mut history: Vec<Outcome> = self
            .responses
            .responses_for_session(session_id)
            .await?
            .iter()
            .map(Outcome::from)
            .collect();
        history.push(Outcome::from(&response));
        let target = self.policy.next_difficulty(tier_at_time, &history);
        if target != tier_at_time {
            debug!(session = %session_id, from = %tier_at_time, to = %target, "tier transition");
        }

        let expected_version = session.version();
        let next_item = if session.is_last_question() {
            None
        } else {
            let picked = self.pick(&session, position + 1, target).await?;
            if picked.is_none() {
                warn!(
                    session = %session_id,
                    answered = position + 1,
                    total = session.total_questions(),
                    "exercise pool exhausted, completing early"
                );
            }
            picked
        };

        let step = match &next_item {
            Some(next) => Advance::Next {
                exercise: next.id(),
                tier: next.tier(),
            },
            None => Advance::Complete,
        };
        session.advance(step, now)?;

        match self
            .answers
            .record_answer(&session, expected_version, &response)
            .await
        {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                warn!(session = %session_id, expected_version, "version check failed on submit");
                return Err(SessionError::VersionConflict(session_id));
            }
            Err(e) => return Err(e.into()),
        }

        let graded = GradedAnswer {
            exercise_id: current,
            position,
            tier: tier_at_time,
            is_correct,
            expected_answer: item.expected_answer().to_owned(),
            explanation: item.explanation().map(str::to_owned),
        };
        let snapshot = SessionSnapshot::from(&session);

        match next_item {
            Some(next) => Ok(SubmitOutcome::Next {
                graded,
                session: snapshot,
                question: QuestionView::new(&next, session.current_index()),
            }),
            None => {
                info!(
                    session = %session_id,
                    subject = %subject,
                    answered = session.current_index(),
                    "session completed"
                );
                let result = self.finalizer.finalize(session_id).await?;
                Ok(SubmitOutcome::Completed {
                    graded,
                    session: snapshot,
                    result,
                })
            }
        }
    }

    /// Ends a running session without a result.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound`, `Forbidden` per session checks
    /// - `InvalidState` if the session is already terminal
    /// - `VersionConflict` if the session changed underneath
    pub async fn abandon(
        &self,
        session_id: SessionId,
        subject: &SubjectId,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut session = self.load_owned(session_id, subject).await?;
        if session.status().is_terminal() {
            return Err(SessionError::InvalidState {
                session: session_id,
                status: session.status(),
            });
        }
        let expected_version = session.version();
        session.abandon(self.clock.now())?;

        match self.sessions.update_session(&session, expected_version).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                warn!(session = %session_id, expected_version, "version check failed on abandon");
                return Err(SessionError::VersionConflict(session_id));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            session = %session_id,
            subject = %subject,
            answered = session.current_index(),
            "session abandoned"
        );
        Ok(SessionSnapshot::from(&session))
    }

    /// The running session for `(subject, kind)`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on backend failures.
    pub async fn find_active(
        &self,
        subject: &SubjectId,
        kind: AssessmentKind,
    ) -> Result<Option<SessionSnapshot>, SessionError> {
        Ok(self
            .sessions
            .find_in_progress(subject, kind)
            .await?
            .as_ref()
            .map(SessionSnapshot::from))
    }

    /// A subject's sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on backend failures.
    pub async fn history(
        &self,
        subject: &SubjectId,
        limit: u32,
    ) -> Result<Vec<SessionSnapshot>, SessionError> {
        Ok(self
            .sessions
            .list_sessions(subject, limit)
            .await?
            .iter()
            .map(SessionSnapshot::from)
            .collect())
    }

    /// The result profile of a completed session owned by `subject`.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound`, `Forbidden` per session checks
    /// - `InvalidState` unless the session is completed
    pub async fn get_result(
        &self,
        session_id: SessionId,
        subject: &SubjectId,
    ) -> Result<ResultProfile, SessionError> {
        let session = self.load_owned(session_id, subject).await?;
        if session.status() != SessionStatus::Completed {
            return Err(SessionError::InvalidState {
                session: session_id,
                status: session.status(),
            });
        }
        self.finalizer.finalize(session_id).await
    }

    fn resolve_total(&self, requested: Option<u32>) -> Result<u32, SessionError> {
        let total = requested.unwrap_or(self.config.default_total_questions);
        if total == 0 || total > self.config.max_total_questions {
            return Err(SessionError::InvalidTotalQuestions {
                requested: total,
                max: self.config.max_total_questions,
            });
        }
        Ok(total)
    }

    async fn load_owned(
        &self,
        session_id: SessionId,
        subject: &SubjectId,
    ) -> Result<SessionRecord, SessionError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound(session_id))?;
        if !session.is_owned_by(subject) {
            return Err(SessionError::Forbidden(session_id));
        }
        Ok(session)
    }

    async fn exercise(&self, id: ExerciseId) -> Result<ExerciseItem, SessionError> {
        self.bank
            .get(id)
            .await?
            .ok_or(SessionError::ExerciseNotFound(id))
    }

    async fn pick(
        &self,
        session: &SessionRecord,
        position: u32,
        tier: DifficultyTier,
    ) -> Result<Option<ExerciseItem>, SessionError> {
        Ok(pick_next(
            &self.bank,
            &PickRequest {
                session_id: session.id(),
                subject_id: session.subject_id(),
                topics: session.topics(),
                position,
                tier,
                asked: session.question_sequence(),
                avoid_repetition: self.config.avoid_repetition,
            },
        )
        .await?)
    }
}
