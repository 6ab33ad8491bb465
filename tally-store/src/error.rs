use crate::backend::BackendError;
use tally_core::CandidateIndex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// the only fatal condition of the store: transient failures kept
    /// happening for the whole retry budget
    #[error("tally store unavailable after {attempts} attempts")]
    Unavailable {
        attempts: u32,
        #[source]
        last: BackendError,
    },

    #[error("candidate {0} has no counter in the tally document")]
    UnknownCandidate(CandidateIndex),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("candidate {index} is mapped to an empty field name")]
    EmptyField { index: usize },

    #[error("field {field:?} holds the counter of more than one candidate")]
    DuplicateField { field: String },
}
