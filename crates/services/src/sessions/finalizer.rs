use std::sync::Arc;

use tracing::{debug, info};

use assess_core::Clock;
use assess_core::model::{ResultProfile, ScoringThresholds, SessionId, SessionStatus};
use storage::repository::{ResponseRepository, ResultRepository, SessionRepository, StorageError};

use crate::error::SessionError;

/// Turns a completed session's responses into its `ResultProfile`.
///
/// A profile is computed and stored once; later calls return the stored copy.
#[derive(Clone)]
pub struct Finalizer {
    clock: Clock,
    thresholds: ScoringThresholds,
    sessions: Arc<dyn SessionRepository>,
    responses: Arc<dyn ResponseRepository>,
    results: Arc<dyn ResultRepository>,
}

impl Finalizer {
    #[must_use]
    pub fn new(
        clock: Clock,
        thresholds: ScoringThresholds,
        sessions: Arc<dyn SessionRepository>,
        responses: Arc<dyn ResponseRepository>,
        results: Arc<dyn ResultRepository>,
    ) -> Self {
        Self {
            clock,
            thresholds,
            sessions,
            responses,
            results,
        }
    }

    /// Returns the session's profile, computing and storing it on first call.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the session does not exist
    /// - `InvalidState` if the session is not completed
    /// - `Storage` on backend failures
    pub async fn finalize(&self, session_id: SessionId) -> Result<ResultProfile, SessionError> {
        if let Some(stored) = self.results.get_result(session_id).await? {
            debug!(session = %session_id, "returning stored result");
            return Ok(stored);
        }

        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound(session_id))?;
        if session.status() != SessionStatus::Completed {
            return Err(SessionError::InvalidState {
                session: session_id,
                status: session.status(),
            });
        }

        let responses = self.responses.responses_for_session(session_id).await?;
        let profile =
            ResultProfile::from_responses(&session, &responses, &self.thresholds, self.clock.now())?;

        match self.results.insert_result(&profile).await {
            Ok(()) => {
                info!(
                    session = %session_id,
                    subject = %profile.subject_id(),
                    score = profile.final_score(),
                    responses = profile.total_responses(),
                    "result finalized"
                );
                Ok(profile)
            }
            // Lost a race with another finalize; the winner's copy is authoritative.
            Err(StorageError::Conflict) => self
                .results
                .get_result(session_id)
                .await?
                .ok_or(SessionError::SessionNotFound(session_id)),
            Err(e) => Err(e.into()),
        }
    }
}
