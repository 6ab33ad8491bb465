use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tally_core::{CandidateIndex, SessionState, SessionToken};

/// Result of claiming a session for a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<T> {
    /// the session was unvoted; the commit ran and its output is here
    Claimed(T),
    /// the session already voted for this very candidate
    Replayed(CandidateIndex),
    /// the session already voted for another candidate
    AlreadyVoted { recorded: CandidateIndex },
}

type SessionCell = Arc<Mutex<SessionState>>;

/// Voting rights of every participant met so far.
///
/// Each session has its own lock: claims of different sessions never wait
/// on each other. The map lock is only taken to find or insert a session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionToken, SessionCell>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// registry where the given sessions already voted, as persisted by
    /// [`TallyStore::record_session`](crate::TallyStore::record_session)
    pub fn from_voted<I>(voted: I) -> Self
    where
        I: IntoIterator<Item = (SessionToken, CandidateIndex)>,
    {
        let sessions = voted
            .into_iter()
            .map(|(token, candidate)| {
                (token, Arc::new(Mutex::new(SessionState::Voted(candidate))))
            })
            .collect();
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    /// claim the session's vote for `candidate`
    ///
    /// `commit` runs only if the session is unvoted, while the session is
    /// held: concurrent claims of the same token wait for it and then see
    /// the outcome. The session turns voted only if `commit` succeeds, a
    /// failing commit leaves it unvoted and its error is returned as is.
    pub fn claim<T, E, F>(
        &self,
        token: &SessionToken,
        candidate: CandidateIndex,
        commit: F,
    ) -> Result<Claim<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let session = self.session(token);
        let mut state = session.lock();
        match *state {
            SessionState::Voted(recorded) if recorded == candidate => {
                Ok(Claim::Replayed(recorded))
            }
            SessionState::Voted(recorded) => Ok(Claim::AlreadyVoted { recorded }),
            SessionState::Unvoted => {
                let committed = commit()?;
                *state = SessionState::Voted(candidate);
                Ok(Claim::Claimed(committed))
            }
        }
    }

    /// state of the session, `None` if the token was never seen
    pub fn state(&self, token: &SessionToken) -> Option<SessionState> {
        let cell = self.sessions.read().get(token).cloned();
        cell.map(|cell| *cell.lock())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// number of sessions that voted
    pub fn voted(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|cell| cell.lock().is_voted())
            .count()
    }

    /// forget every session, to start a new voting period
    pub fn clear(&self) {
        self.sessions.write().clear()
    }

    fn session(&self, token: &SessionToken) -> SessionCell {
        if let Some(cell) = self.sessions.read().get(token) {
            return cell.clone();
        }
        self.sessions
            .write()
            .entry(token.clone())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token(t: &str) -> SessionToken {
        SessionToken::new(t)
    }

    #[test]
    pub fn first_claim_commits() {
        let registry = SessionRegistry::new();
        let claim: Result<_, ()> = registry.claim(&token("abc"), CandidateIndex::new(1), || Ok(7));

        assert_eq!(claim, Ok(Claim::Claimed(7)));
        assert_eq!(
            registry.state(&token("abc")),
            Some(SessionState::Voted(CandidateIndex::new(1)))
        );
    }

    #[test]
    pub fn same_candidate_is_a_replay() {
        let registry = SessionRegistry::new();
        let _: Result<_, ()> = registry.claim(&token("abc"), CandidateIndex::new(1), || Ok(()));

        let claim: Result<Claim<()>, ()> =
            registry.claim(&token("abc"), CandidateIndex::new(1), || {
                panic!("a voted session never commits again")
            });
        assert_eq!(claim, Ok(Claim::Replayed(CandidateIndex::new(1))));
    }

    #[test]
    pub fn other_candidate_is_refused() {
        let registry = SessionRegistry::new();
        let _: Result<_, ()> = registry.claim(&token("abc"), CandidateIndex::new(1), || Ok(()));

        let claim: Result<Claim<()>, ()> =
            registry.claim(&token("abc"), CandidateIndex::new(2), || {
                panic!("a voted session never commits again")
            });
        assert_eq!(
            claim,
            Ok(Claim::AlreadyVoted {
                recorded: CandidateIndex::new(1)
            })
        );
    }

    #[test]
    pub fn failed_commit_leaves_the_session_unvoted() {
        let registry = SessionRegistry::new();
        let claim: Result<Claim<()>, &str> =
            registry.claim(&token("abc"), CandidateIndex::new(1), || Err("store down"));
        assert_eq!(claim, Err("store down"));
        assert_eq!(registry.state(&token("abc")), Some(SessionState::Unvoted));

        let retry: Result<_, &str> =
            registry.claim(&token("abc"), CandidateIndex::new(2), || Ok(()));
        assert_eq!(retry, Ok(Claim::Claimed(())));
    }

    #[test]
    pub fn concurrent_claims_of_one_token_commit_once() {
        let registry = SessionRegistry::new();
        let commits = AtomicUsize::new(0);

        let claims: Vec<Claim<()>> = (0..64)
            .into_par_iter()
            .map(|_| {
                registry
                    .claim::<_, (), _>(&token("abc"), CandidateIndex::new(0), || {
                        commits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();

        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(
            claims
                .iter()
                .filter(|c| matches!(c, Claim::Claimed(_)))
                .count(),
            1
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.voted(), 1);
    }

    #[test]
    pub fn unknown_token_has_no_state() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.state(&token("nobody")), None);
        assert!(registry.is_empty());
    }

    #[test]
    pub fn restored_sessions_are_voted() {
        let registry = SessionRegistry::from_voted(vec![(token("abc"), CandidateIndex::new(2))]);

        let claim: Result<Claim<()>, ()> =
            registry.claim(&token("abc"), CandidateIndex::new(2), || {
                panic!("a restored session never commits again")
            });
        assert_eq!(claim, Ok(Claim::Replayed(CandidateIndex::new(2))));
        assert_eq!(registry.voted(), 1);
    }

    #[test]
    pub fn clear_forgets_sessions() {
        let registry = SessionRegistry::new();
        let _: Result<_, ()> = registry.claim(&token("abc"), CandidateIndex::new(0), || Ok(()));
        registry.clear();
        assert!(registry.is_empty());
    }
}
