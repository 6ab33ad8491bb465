use crate::candidate::CandidateIndex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-participant token. It is issued outside of the tally and only
/// needs to be unique and stable across retries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Voting right of one participant.
///
/// `Unvoted -> Voted` happens at most once and is never reverted. The chosen
/// candidate is kept so a replayed submission can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "property-test-api"),
    derive(test_strategy::Arbitrary)
)]
#[serde(rename_all = "kebab-case", tag = "state", content = "candidate")]
pub enum SessionState {
    Unvoted,
    Voted(CandidateIndex),
}

impl SessionState {
    pub fn is_voted(&self) -> bool {
        matches!(self, SessionState::Voted(_))
    }

    /// the candidate recorded with the session, if it voted
    pub fn recorded(&self) -> Option<CandidateIndex> {
        match self {
            SessionState::Unvoted => None,
            SessionState::Voted(candidate) => Some(*candidate),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Unvoted
    }
}
