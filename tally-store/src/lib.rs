//! Storage side of the live tally: the authoritative counters and the
//! participants' voting rights.

pub mod backend;
mod error;
mod layout;
mod retry;
mod session;
mod tally_store;

#[cfg(any(test, feature = "test-api"))]
pub mod testing;

pub use backend::{DocumentBackend, DocumentKey, MemoryBackend, Revision};
pub use error::{LayoutError, StoreError};
pub use layout::FieldLayout;
pub use retry::{Pause, RetryPolicy};
pub use session::{Claim, SessionRegistry};
pub use tally_store::{Increment, TallyListener, TallyStore, WriteStrategy};
