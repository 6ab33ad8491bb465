use crate::candidate::CandidateIndex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of a [`Tally`]. Starts at zero and moves forward by exactly one
/// for every accepted ballot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Version = Version(0);

    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    #[must_use]
    pub fn next(self) -> Version {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Version {
    fn from(n: u64) -> Self {
        Version::new(n)
    }
}

impl From<Version> for u64 {
    fn from(v: Version) -> Self {
        v.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authoritative counts per candidate, plus the version they belong to.
///
/// A tally is a value: applying a ballot returns a new tally and leaves the
/// original untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tally {
    counts: Vec<u64>,
    version: Version,
}

impl Tally {
    /// the tally of a voting period that has not received any ballot yet
    pub fn zero(candidates: usize) -> Self {
        Self {
            counts: vec![0; candidates],
            version: Version::ZERO,
        }
    }

    /// rebuild a tally from the persisted counters
    ///
    /// Only counters are persisted. Each accepted ballot adds one to exactly
    /// one counter and one to the version, so the version of a persisted
    /// record is the number of ballots it holds.
    pub fn from_counts(counts: Vec<u64>) -> Self {
        let version = Version::new(saturating_sum(&counts));
        Self { counts, version }
    }

    /// the tally with one more ballot for `candidate`, `None` if the
    /// candidate is not part of this tally
    #[must_use = "This function does not modify the tally, the result contains the new version of the tally"]
    pub fn with_ballot(&self, candidate: CandidateIndex) -> Option<Self> {
        let mut counts = self.counts.clone();
        let count = counts.get_mut(candidate.as_usize())?;
        *count = count.saturating_add(1);
        Some(Self {
            counts,
            version: self.version.next(),
        })
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self, candidate: CandidateIndex) -> Option<u64> {
        self.counts.get(candidate.as_usize()).copied()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// number of ballots accepted so far
    pub fn total(&self) -> u64 {
        saturating_sum(&self.counts)
    }

    /// number of candidates
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub(crate) fn saturating_sum(counts: &[u64]) -> u64 {
    counts.iter().fold(0, |sum, count| sum.saturating_add(*count))
}

#[cfg(any(test, feature = "property-test-api"))]
mod arbitrary {
    use super::Tally;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for Tally {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            let len = 2 + usize::arbitrary(g) % 5;
            let counts = (0..len).map(|_| u64::arbitrary(g) % 10_000).collect();
            Tally::from_counts(counts)
        }
    }
}
