//! Asynchronous interface offered to the participants and observers.

use crate::channel::Subscription;
use crate::engine::Engine;
use crate::error::{Rejection, ServiceError, SubmitError};
use crate::gateway::Accepted;
use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tally_core::{ResultSnapshot, SessionToken, Tally, Version};
use tally_store::DocumentBackend;

/// Answer to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl SubmitResponse {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: Rejection) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}

impl From<Result<Accepted, SubmitError>> for SubmitResponse {
    fn from(result: Result<Accepted, SubmitError>) -> Self {
        match result {
            Ok(_) => SubmitResponse::accepted(),
            Err(err) => SubmitResponse::rejected(err.reason()),
        }
    }
}

/// Raw counters, as answered to a tally query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyView {
    pub counts: Vec<u64>,
    pub version: Version,
}

impl From<Tally> for TallyView {
    fn from(tally: Tally) -> Self {
        Self {
            counts: tally.counts().to_vec(),
            version: tally.version(),
        }
    }
}

/// Interface between the tally and the participants and observers.
///
/// An implementation may serve it from an in-process engine or forward the
/// calls to a remote one.
#[async_trait]
pub trait VoteService {
    /// The type of the asynchronous streams returned by the
    /// `subscribe` method.
    type SnapshotStream: Stream<Item = ResultSnapshot> + Send + Sync;

    /// Casts the participant's ballot. A submission refused because the
    /// store was unavailable can be sent again as is.
    async fn submit_vote(&self, candidate_index: u32, session_token: SessionToken)
        -> SubmitResponse;

    /// Current counters.
    async fn get_tally(&self) -> Result<TallyView, ServiceError>;

    /// Current results followed by every newer result.
    async fn subscribe(&self) -> Result<(ResultSnapshot, Self::SnapshotStream), ServiceError>;
}

/// The calls complete on the polling thread. A submission that meets an
/// unavailable store waits out its retry backoff there and blocks the
/// executor meanwhile; open the engine with a [`Pause`](tally_store::Pause)
/// hook through [`Engine::with_pause`] or configure an immediate
/// [`RetryPolicy`](tally_store::RetryPolicy) when that matters.
#[async_trait]
impl<B: DocumentBackend + 'static> VoteService for Engine<B> {
    type SnapshotStream = Subscription;

    async fn submit_vote(
        &self,
        candidate_index: u32,
        session_token: SessionToken,
    ) -> SubmitResponse {
        let result = self.submit(&session_token, candidate_index);
        if let Err(err) = &result {
            tracing::debug!(error = %err, reason = ?err.reason(), "submission rejected");
        }
        result.into()
    }

    async fn get_tally(&self) -> Result<TallyView, ServiceError> {
        Ok(self.tally()?.into())
    }

    async fn subscribe(&self) -> Result<(ResultSnapshot, Self::SnapshotStream), ServiceError> {
        Ok(Engine::subscribe(self)?)
    }
}
