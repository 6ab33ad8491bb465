use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

/// the smallest candidate set that makes a vote meaningful
pub const MIN_CANDIDATES: usize = 2;
/// candidate indices are stored on a byte
pub const MAX_CANDIDATES: usize = u8::MAX as usize + 1;

/// Stable position of a candidate in the closed, ordered [`CandidateSet`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(
    any(test, feature = "property-test-api"),
    derive(test_strategy::Arbitrary)
)]
#[serde(transparent)]
pub struct CandidateIndex(u8);

impl CandidateIndex {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// index of the candidate at the given position in a list of counts,
    /// `None` if the position cannot be an index
    pub fn from_position(position: usize) -> Option<Self> {
        u8::try_from(position).ok().map(Self)
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for CandidateIndex {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

impl From<CandidateIndex> for u8 {
    fn from(index: CandidateIndex) -> Self {
        index.0
    }
}

impl fmt::Display for CandidateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A candidate of the vote. The display key is opaque to the tally: it is
/// only carried along so the presentation layer can look up a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Candidate {
    index: CandidateIndex,
    display_key: String,
}

impl Candidate {
    pub fn index(&self) -> CandidateIndex {
        self.index
    }

    pub fn display_key(&self) -> &str {
        &self.display_key
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CandidateSetError {
    #[error("a vote needs at least {} candidates, got {actual}", MIN_CANDIDATES)]
    TooFewCandidates { actual: usize },

    #[error("a vote supports at most {} candidates, got {actual}", MAX_CANDIDATES)]
    TooManyCandidates { actual: usize },

    #[error("candidate {index} has an empty display key")]
    EmptyDisplayKey { index: usize },

    #[error("display key {key:?} is used by more than one candidate")]
    DuplicateDisplayKey { key: String },
}

/// The candidate index given to the gateway does not name a candidate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("candidate index {index} is out of range, there are {candidates} candidates")]
pub struct InvalidCandidate {
    pub index: u32,
    pub candidates: usize,
}

/// The closed, ordered set of candidates, fixed for the whole voting period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: Box<[Candidate]>,
}

impl CandidateSet {
    /// build the set from the display keys, in index order
    ///
    /// # errors
    ///
    /// * fewer than two or more than 256 candidates;
    /// * an empty display key;
    /// * the same display key twice.
    pub fn new<I, K>(display_keys: I) -> Result<Self, CandidateSetError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = display_keys.into_iter().map(Into::into).collect();

        if keys.len() < MIN_CANDIDATES {
            return Err(CandidateSetError::TooFewCandidates { actual: keys.len() });
        }
        if keys.len() > MAX_CANDIDATES {
            return Err(CandidateSetError::TooManyCandidates { actual: keys.len() });
        }

        let mut seen = HashSet::with_capacity(keys.len());
        let mut candidates = Vec::with_capacity(keys.len());
        for (position, display_key) in keys.into_iter().enumerate() {
            if display_key.is_empty() {
                return Err(CandidateSetError::EmptyDisplayKey { index: position });
            }
            if !seen.insert(display_key.clone()) {
                return Err(CandidateSetError::DuplicateDisplayKey { key: display_key });
            }
            let index = CandidateIndex::from_position(position)
                .ok_or(CandidateSetError::TooManyCandidates { actual: position + 1 })?;
            candidates.push(Candidate { index, display_key });
        }

        Ok(Self {
            candidates: candidates.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// always false, a candidate set holds at least two candidates
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// validate a raw candidate index as received from a participant
    pub fn index(&self, raw: u32) -> Result<CandidateIndex, InvalidCandidate> {
        let invalid = InvalidCandidate {
            index: raw,
            candidates: self.len(),
        };
        usize::try_from(raw)
            .ok()
            .filter(|position| *position < self.len())
            .and_then(CandidateIndex::from_position)
            .ok_or(invalid)
    }

    pub fn get(&self, index: CandidateIndex) -> Option<&Candidate> {
        self.candidates.get(index.as_usize())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(any(test, feature = "property-test-api"))]
mod arbitrary {
    use super::CandidateIndex;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for CandidateIndex {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            CandidateIndex(u8::arbitrary(g))
        }
    }
}
