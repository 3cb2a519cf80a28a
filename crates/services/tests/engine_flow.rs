mod common;

use std::collections::HashSet;

use assess_core::model::{
    AssessmentKind, DifficultyTier, ExerciseId, SessionId, SessionStatus, Tally, Topic,
};
use services::{Answer, SessionError, SubmitOutcome};
use storage::repository::{InMemoryRepository, ResponseRepository, Storage};

use common::{add_exercise, engine, full_catalog, right_answer, subject};

#[tokio::test]
async fn full_session_never_repeats_a_question() {
    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo.clone());
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Placement, Some(12), &[])
        .await
        .unwrap();
    let mut question = started.question.unwrap();
    let mut answered = 0;

    loop {
        let text = if answered % 3 == 2 {
            "wrong".to_owned()
        } else {
            right_answer(question.exercise_id)
        };
        let outcome = engine
            .submit_answer(
                started.session.session_id,
                &ana,
                Answer::new(text).for_exercise(question.exercise_id),
            )
            .await
            .unwrap();
        answered += 1;
        match outcome {
            SubmitOutcome::Next { question: next, .. } => {
                assert_eq!(next.position, answered);
                question = next;
            }
            SubmitOutcome::Completed {
                session, result, ..
            } => {
                assert_eq!(session.status, SessionStatus::Completed);
                let unique: HashSet<ExerciseId> =
                    session.question_sequence.iter().copied().collect();
                assert_eq!(unique.len(), session.question_sequence.len());
                assert_eq!(session.question_sequence.len(), 12);
                assert_eq!(result.total_responses(), 12);
                assert_eq!(result.correct_responses(), 8);
                break;
            }
        }
    }
    assert_eq!(answered, 12);
}

#[tokio::test]
async fn three_question_scenario_scores_66_7() {
    let repo = InMemoryRepository::new();
    add_exercise(&repo, 1, Topic::Grammar, DifficultyTier::Easy).await;
    add_exercise(&repo, 2, Topic::Grammar, DifficultyTier::Medium).await;
    add_exercise(&repo, 3, Topic::Grammar, DifficultyTier::Medium).await;
    add_exercise(&repo, 4, Topic::Grammar, DifficultyTier::Hard).await;
    let storage = Storage::from_repository(repo.clone());
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Placement, Some(3), &[Topic::Grammar])
        .await
        .unwrap();
    let id = started.session.session_id;
    let q1 = started.question.unwrap();
    assert_eq!(q1.tier, DifficultyTier::Easy);

    let SubmitOutcome::Next { question: q2, .. } = engine
        .submit_answer(id, &ana, Answer::new(right_answer(q1.exercise_id)))
        .await
        .unwrap()
    else {
        panic!("expected a second question");
    };
    assert_eq!(q2.tier, DifficultyTier::Medium);

    let SubmitOutcome::Next { question: q3, .. } = engine
        .submit_answer(id, &ana, Answer::new(right_answer(q2.exercise_id)))
        .await
        .unwrap()
    else {
        panic!("expected a third question");
    };
    assert_eq!(q3.tier, DifficultyTier::Medium);

    let outcome = engine
        .submit_answer(id, &ana, Answer::new("no idea"))
        .await
        .unwrap();
    assert!(!outcome.graded().is_correct);
    assert!(outcome.is_complete());
    assert_eq!(outcome.session().current_index, 3);
    let SubmitOutcome::Completed { result, .. } = outcome else {
        panic!("expected completion");
    };

    assert!((result.final_score() - 66.7).abs() < 1e-9);
    let breakdown = result.difficulty_breakdown();
    assert_eq!(
        breakdown.get(&DifficultyTier::Easy),
        Some(&Tally {
            correct: 1,
            incorrect: 0
        })
    );
    assert_eq!(
        breakdown.get(&DifficultyTier::Medium),
        Some(&Tally {
            correct: 1,
            incorrect: 1
        })
    );
    assert!(!breakdown.contains_key(&DifficultyTier::Hard));
    assert_eq!(result.topics_covered(), &[Topic::Grammar]);

    let tiers: Vec<DifficultyTier> = repo
        .responses_for_session(id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.difficulty_at_time)
        .collect();
    assert_eq!(
        tiers,
        vec![DifficultyTier::Easy, DifficultyTier::Medium, DifficultyTier::Medium]
    );
}

#[tokio::test]
async fn foreign_subjects_are_forbidden() {
    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo);
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Progress, Some(1), &[])
        .await
        .unwrap();
    let id = started.session.session_id;
    let q = started.question.unwrap();

    for intruder in ["ben", "Ana", "ana "] {
        let other = subject(intruder);
        assert!(matches!(
            engine
                .submit_answer(id, &other, Answer::new(right_answer(q.exercise_id)))
                .await,
            Err(SessionError::Forbidden(s)) if s == id
        ));
        assert!(matches!(
            engine.resume(id, &other).await,
            Err(SessionError::Forbidden(_))
        ));
        assert!(matches!(
            engine.abandon(id, &other).await,
            Err(SessionError::Forbidden(_))
        ));
    }

    engine
        .submit_answer(id, &ana, Answer::new(right_answer(q.exercise_id)))
        .await
        .unwrap();
    assert!(matches!(
        engine.get_result(id, &subject("ben")).await,
        Err(SessionError::Forbidden(_))
    ));
    assert!(engine.get_result(id, &ana).await.is_ok());
}

#[tokio::test]
async fn second_start_conflicts_until_abandoned() {
    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo);
    let engine = engine(&storage);
    let ana = subject("ana");

    let first = engine
        .start(&ana, AssessmentKind::Placement, Some(5), &[])
        .await
        .unwrap();
    let err = engine
        .start(&ana, AssessmentKind::Placement, Some(5), &[])
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(err, SessionError::ActiveSessionExists { .. }));

    // A different kind is an independent slot.
    engine
        .start(&ana, AssessmentKind::Practice, Some(5), &[])
        .await
        .unwrap();

    let active = engine
        .find_active(&ana, AssessmentKind::Placement)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.session_id, first.session.session_id);

    let abandoned = engine.abandon(first.session.session_id, &ana).await.unwrap();
    assert_eq!(abandoned.status, SessionStatus::Abandoned);
    assert!(matches!(
        engine.abandon(first.session.session_id, &ana).await,
        Err(SessionError::InvalidState {
            status: SessionStatus::Abandoned,
            ..
        })
    ));
    assert!(matches!(
        engine
            .submit_answer(first.session.session_id, &ana, Answer::new("x"))
            .await,
        Err(SessionError::InvalidState { .. })
    ));

    let again = engine
        .start(&ana, AssessmentKind::Placement, Some(5), &[])
        .await
        .unwrap();
    assert_ne!(again.session.session_id, first.session.session_id);

    let history = engine.history(&ana, 10).await.unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn finalize_twice_is_byte_identical() {
    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo);
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Placement, Some(2), &[])
        .await
        .unwrap();
    let id = started.session.session_id;
    let mut question = started.question.unwrap();
    let first = loop {
        match engine
            .submit_answer(id, &ana, Answer::new(right_answer(question.exercise_id)))
            .await
            .unwrap()
        {
            SubmitOutcome::Next { question: next, .. } => question = next,
            SubmitOutcome::Completed { result, .. } => break result,
        }
    };

    let second = engine.get_result(id, &ana).await.unwrap();
    let third = engine.finalizer().finalize(id).await.unwrap();
    let bytes = serde_json::to_string(&first).unwrap();
    assert_eq!(serde_json::to_string(&second).unwrap(), bytes);
    assert_eq!(serde_json::to_string(&third).unwrap(), bytes);
    assert!((first.final_score() - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn stale_answer_changes_nothing() {
    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo.clone());
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Placement, Some(4), &[])
        .await
        .unwrap();
    let id = started.session.session_id;
    let q1 = started.question.unwrap();

    engine
        .submit_answer(
            id,
            &ana,
            Answer::new(right_answer(q1.exercise_id)).for_exercise(q1.exercise_id),
        )
        .await
        .unwrap();
    let before = engine.resume(id, &ana).await.unwrap();

    // A network retry of the first submission.
    let err = engine
        .submit_answer(
            id,
            &ana,
            Answer::new(right_answer(q1.exercise_id)).for_exercise(q1.exercise_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::StaleAnswer { submitted, .. } if submitted == q1.exercise_id
    ));

    let after = engine.resume(id, &ana).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(repo.responses_for_session(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resume_is_read_only() {
    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo);
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Placement, None, &[Topic::Vocabulary])
        .await
        .unwrap();
    assert_eq!(started.session.total_questions, 10);
    let id = started.session.session_id;

    let once = engine.resume(id, &ana).await.unwrap();
    let twice = engine.resume(id, &ana).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(once.question, started.question);
    assert_eq!(
        engine.current_question(id, &ana).await.unwrap(),
        started.question.unwrap()
    );

    assert!(matches!(
        engine.get_result(id, &ana).await,
        Err(SessionError::InvalidState {
            status: SessionStatus::InProgress,
            ..
        })
    ));
}

#[tokio::test]
async fn exhausted_pool_completes_early() {
    let repo = InMemoryRepository::new();
    add_exercise(&repo, 1, Topic::Grammar, DifficultyTier::Easy).await;
    add_exercise(&repo, 2, Topic::Grammar, DifficultyTier::Hard).await;
    add_exercise(&repo, 3, Topic::Listening, DifficultyTier::Hard).await;
    let storage = Storage::from_repository(repo);
    let engine = engine(&storage);
    let ana = subject("ana");

    let started = engine
        .start(&ana, AssessmentKind::Practice, Some(5), &[Topic::Grammar])
        .await
        .unwrap();
    let id = started.session.session_id;
    let q1 = started.question.unwrap();

    let SubmitOutcome::Next { question: q2, .. } = engine
        .submit_answer(id, &ana, Answer::new(right_answer(q1.exercise_id)))
        .await
        .unwrap()
    else {
        panic!("a hard question should stand in for the missing medium one");
    };
    assert_eq!(q2.exercise_id, ExerciseId::new(2));

    let outcome = engine
        .submit_answer(id, &ana, Answer::new("nope"))
        .await
        .unwrap();
    let SubmitOutcome::Completed {
        session, result, ..
    } = outcome
    else {
        panic!("expected early completion");
    };
    assert_eq!(session.current_index, 2);
    assert_eq!(session.total_questions, 5);
    assert_eq!(result.total_responses(), 2);
    assert!((result.final_score() - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn start_validates_target_and_catalog() {
    let empty = Storage::in_memory();
    let engine_empty = engine(&empty);
    let ana = subject("ana");
    assert!(matches!(
        engine_empty
            .start(&ana, AssessmentKind::Placement, Some(3), &[])
            .await,
        Err(SessionError::NoExercisesAvailable)
    ));

    let repo = InMemoryRepository::new();
    full_catalog(&repo).await;
    let storage = Storage::from_repository(repo);
    let engine = engine(&storage);
    assert!(matches!(
        engine.start(&ana, AssessmentKind::Placement, Some(0), &[]).await,
        Err(SessionError::InvalidTotalQuestions { requested: 0, .. })
    ));
    assert!(matches!(
        engine
            .start(&ana, AssessmentKind::Placement, Some(101), &[])
            .await,
        Err(SessionError::InvalidTotalQuestions {
            requested: 101,
            max: 100
        })
    ));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let storage = Storage::in_memory();
    let engine = engine(&storage);
    let missing = SessionId::generate();
    assert!(matches!(
        engine
            .submit_answer(missing, &subject("ana"), Answer::new("a"))
            .await,
        Err(SessionError::SessionNotFound(id)) if id == missing
    ));
    assert!(matches!(
        engine.get_result(missing, &subject("ana")).await,
        Err(SessionError::SessionNotFound(_))
    ));
}
