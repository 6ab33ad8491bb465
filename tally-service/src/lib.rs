//! Ballot submission and live results on top of the tally store.

pub mod channel;
mod engine;
pub mod error;
mod gateway;
mod service;
mod settings;

pub use channel::{LiveSync, Subscription, SubscriptionHandle};
pub use engine::Engine;
pub use error::{ChannelDisconnected, EngineError, Rejection, ServiceError, SubmitError};
pub use gateway::{Accepted, SubmissionGateway};
pub use service::{SubmitResponse, TallyView, VoteService};
pub use settings::{CandidateSettings, Settings, SettingsError};
