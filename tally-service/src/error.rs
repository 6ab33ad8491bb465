use serde::{Deserialize, Serialize};
use tally_core::{CandidateIndex, CandidateSetError, InvalidCandidate};
use tally_store::{LayoutError, StoreError};
use thiserror::Error;

/// Reason of a rejected submission, as reported to participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rejection {
    InvalidCandidate,
    AlreadyVoted,
    StoreUnavailable,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    InvalidCandidate(#[from] InvalidCandidate),

    #[error("session already voted for candidate {recorded}")]
    AlreadyVoted { recorded: CandidateIndex },

    #[error("ballot could not be recorded")]
    Store(#[from] StoreError),
}

impl SubmitError {
    pub fn reason(&self) -> Rejection {
        match self {
            SubmitError::InvalidCandidate(_) => Rejection::InvalidCandidate,
            SubmitError::AlreadyVoted { .. } => Rejection::AlreadyVoted,
            SubmitError::Store(StoreError::UnknownCandidate(_)) => Rejection::InvalidCandidate,
            SubmitError::Store(StoreError::Unavailable { .. }) => Rejection::StoreUnavailable,
        }
    }

    /// the same submission may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        self.reason() == Rejection::StoreUnavailable
    }
}

/// The live channel was closed, observers have to subscribe again.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("live sync channel is disconnected")]
pub struct ChannelDisconnected;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Disconnected(#[from] ChannelDisconnected),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid candidate set")]
    Candidates(#[from] CandidateSetError),

    #[error("invalid tally document layout")]
    Layout(#[from] LayoutError),

    #[error("the retry budget must allow at least one attempt")]
    NoRetryBudget,

    #[error("cannot reach the tally at startup")]
    Store(#[from] StoreError),
}
