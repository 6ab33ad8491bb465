use futures::executor::block_on;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{CandidateIndex, SessionState, SessionToken, Version};
use tally_service::{
    Accepted, Engine, Rejection, Settings, SubmitError, SubmitResponse, VoteService,
};
use tally_store::testing::FlakyBackend;
use tally_store::{MemoryBackend, RetryPolicy, WriteStrategy};
use test_strategy::proptest;

type Backend = Arc<FlakyBackend<MemoryBackend>>;

fn engine_with(strategy: WriteStrategy, retry: RetryPolicy) -> (Engine<Backend>, Backend) {
    let backend = Arc::new(FlakyBackend::new(MemoryBackend::new()));
    let settings = Settings {
        write_strategy: strategy,
        retry,
        ..Settings::default()
    };
    (Engine::new(&settings, backend.clone()).unwrap(), backend)
}

fn engine() -> (Engine<Backend>, Backend) {
    engine_with(WriteStrategy::default(), RetryPolicy::immediate(4))
}

// enough attempts for every rayon worker to lose the race
fn contended_engine(strategy: WriteStrategy) -> Engine<Backend> {
    engine_with(strategy, RetryPolicy::immediate(10_000)).0
}

#[test]
fn resubmitting_the_same_candidate_counts_once() {
    let (engine, _) = engine();
    let token = SessionToken::new("abc");

    assert_eq!(
        block_on(engine.submit_vote(1, token.clone())),
        SubmitResponse::accepted()
    );
    assert_eq!(
        block_on(engine.submit_vote(1, token.clone())),
        SubmitResponse::accepted()
    );

    let tally = block_on(engine.get_tally()).unwrap();
    assert_eq!(tally.counts, vec![0, 1, 0]);
    assert_eq!(tally.version, Version::new(1));
}

#[test]
fn voting_for_another_candidate_is_rejected() {
    let (engine, _) = engine();
    let token = SessionToken::new("abc");

    block_on(engine.submit_vote(1, token.clone()));
    assert_eq!(
        block_on(engine.submit_vote(2, token.clone())),
        SubmitResponse::rejected(Rejection::AlreadyVoted)
    );

    assert_eq!(block_on(engine.get_tally()).unwrap().counts, vec![0, 1, 0]);
    assert_eq!(
        engine.session_state(&token),
        Some(SessionState::Voted(CandidateIndex::new(1)))
    );
}

#[test]
fn out_of_range_candidate_mutates_nothing() {
    let (engine, backend) = engine();
    let token = SessionToken::new("abc");

    for raw in [3, 255, 256, u32::MAX] {
        assert_eq!(
            block_on(engine.submit_vote(raw, token.clone())),
            SubmitResponse::rejected(Rejection::InvalidCandidate)
        );
    }

    assert_eq!(backend.writes(), 0);
    assert_eq!(engine.session_state(&token), None);
    assert_eq!(block_on(engine.get_tally()).unwrap().version, Version::ZERO);

    assert_eq!(
        block_on(engine.submit_vote(0, token)),
        SubmitResponse::accepted()
    );
}

#[test]
fn unavailable_store_can_be_retried() {
    let (engine, backend) = engine();
    let token = SessionToken::new("abc");
    backend.inject_outages(4);

    let err = engine.submit(&token, 2).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.reason(), Rejection::StoreUnavailable);
    assert_eq!(engine.session_state(&token), Some(SessionState::Unvoted));

    assert_eq!(
        block_on(engine.submit_vote(2, token.clone())),
        SubmitResponse::accepted()
    );
    assert_eq!(block_on(engine.get_tally()).unwrap().counts, vec![0, 0, 1]);
}

#[test]
fn store_backoff_goes_through_the_pause_hook() {
    let backend = Arc::new(FlakyBackend::new(MemoryBackend::new()));
    let settings = Settings {
        retry: RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60),
        },
        ..Settings::default()
    };
    let pauses = Arc::new(AtomicUsize::new(0));
    let counter = pauses.clone();
    let engine = Engine::with_pause(
        &settings,
        backend.clone(),
        Arc::new(move |_: Duration| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    backend.inject_outages(3);
    assert!(matches!(
        engine.submit(&SessionToken::new("abc"), 1),
        Ok(Accepted::Counted(_))
    ));
    assert_eq!(pauses.load(Ordering::SeqCst), 3);
}

#[test]
fn conflicts_within_the_budget_are_invisible() {
    let (engine, backend) = engine();
    backend.inject_conflicts(3);

    match engine.submit(&SessionToken::new("abc"), 0).unwrap() {
        Accepted::Counted(increment) => assert_eq!(increment.count, 1),
        other => panic!("unexpected {:?}", other),
    }
}

fn distinct_sessions_are_all_counted(strategy: WriteStrategy) {
    const BALLOTS: u32 = 900;
    let engine = contended_engine(strategy);

    let versions: Vec<Version> = (0..BALLOTS)
        .into_par_iter()
        .map(|i| {
            let token = SessionToken::new(format!("session-{}", i));
            match engine.submit(&token, i % 3) {
                Ok(Accepted::Counted(increment)) => increment.version(),
                other => panic!("unexpected {:?}", other),
            }
        })
        .collect();

    let tally = engine.tally().unwrap();
    assert_eq!(tally.counts(), &[300, 300, 300]);
    assert_eq!(tally.total(), BALLOTS as u64);
    assert_eq!(engine.live().latest().version, tally.version());

    let mut versions = versions;
    versions.sort();
    versions.dedup();
    assert_eq!(versions.len(), BALLOTS as usize);
}

#[test]
fn concurrent_sessions_with_compare_and_swap() {
    distinct_sessions_are_all_counted(WriteStrategy::CompareAndSwap)
}

#[test]
fn concurrent_sessions_with_atomic_increment() {
    distinct_sessions_are_all_counted(WriteStrategy::AtomicIncrement)
}

#[test]
fn concurrent_submissions_of_one_session_count_once() {
    let engine = contended_engine(WriteStrategy::CompareAndSwap);
    let token = SessionToken::new("abc");

    let outcomes: Vec<Result<Accepted, SubmitError>> = (0..64)
        .into_par_iter()
        .map(|_| engine.submit(&token, 1))
        .collect();

    let counted = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(Accepted::Counted(_))))
        .count();
    assert_eq!(counted, 1);
    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(engine.tally().unwrap().counts(), &[0, 1, 0]);
}

#[test]
fn racing_candidates_of_one_session_count_once() {
    let engine = contended_engine(WriteStrategy::CompareAndSwap);
    let token = SessionToken::new("abc");

    let outcomes: Vec<Result<Accepted, SubmitError>> = (0..64u32)
        .into_par_iter()
        .map(|i| engine.submit(&token, i % 3))
        .collect();

    let recorded = match engine.session_state(&token) {
        Some(SessionState::Voted(candidate)) => candidate,
        other => panic!("unexpected {:?}", other),
    };
    for outcome in outcomes {
        match outcome {
            Ok(Accepted::Counted(increment)) => assert_eq!(increment.candidate, recorded),
            Ok(Accepted::Replayed { candidate }) => assert_eq!(candidate, recorded),
            Err(err) => assert_eq!(err, SubmitError::AlreadyVoted { recorded }),
        }
    }
    assert_eq!(engine.tally().unwrap().total(), 1);
}

fn voted_sessions(engine: &Engine<Backend>, sessions: u8) -> u64 {
    (0..sessions)
        .filter_map(|session| engine.session_state(&SessionToken::new(format!("s{}", session))))
        .filter(SessionState::is_voted)
        .count() as u64
}

#[proptest(cases = 32)]
fn total_matches_the_voted_sessions(
    #[strategy(proptest::collection::vec((0u8..8, 0u32..5), 0..64))] ballots: Vec<(u8, u32)>,
) {
    let (engine, _) = engine();
    for (session, candidate) in &ballots {
        let _ = engine.submit(&SessionToken::new(format!("s{}", session)), *candidate);
    }

    let voted = voted_sessions(&engine, 8);
    let tally = engine.tally().unwrap();
    proptest::prop_assert_eq!(tally.total(), voted);
    proptest::prop_assert_eq!(tally.version(), Version::new(voted));
}
