//! Core types of the live vote tally.
//!
//! This crate holds everything that does not need a backing medium: the
//! closed candidate set, the versioned [`Tally`], the participant
//! [`SessionState`] and the pure aggregation from a tally into a
//! [`ResultSnapshot`].

pub mod candidate;
pub mod session;
pub mod snapshot;
pub mod tally;

pub use candidate::{Candidate, CandidateIndex, CandidateSet, CandidateSetError, InvalidCandidate};
pub use session::{SessionState, SessionToken};
pub use snapshot::{PercentageBasis, ResultSnapshot};
pub use tally::{Tally, Version};
