use parking_lot::Mutex;
use std::task::{Context, Poll, Waker};
use tally_core::{ResultSnapshot, Version};

/// Delivery slot of one subscriber: holds at most the newest snapshot not
/// yet taken by the subscriber.
pub(super) struct Slot {
    state: Mutex<State>,
}

struct State {
    pending: Option<ResultSnapshot>,
    /// newest version handed to this slot, delivered or pending
    seen: Version,
    waker: Option<Waker>,
    closed: bool,
}

impl Slot {
    pub(super) fn new(seen: Version) -> Self {
        Self {
            state: Mutex::new(State {
                pending: None,
                seen,
                waker: None,
                closed: false,
            }),
        }
    }

    /// hand a snapshot to the subscriber, replacing any pending older one.
    /// Returns false if the snapshot is not newer than what the slot saw.
    pub(super) fn offer(&self, snapshot: &ResultSnapshot) -> bool {
        let waker = {
            let mut state = self.state.lock();
            if state.closed || snapshot.version <= state.seen {
                return false;
            }
            state.seen = snapshot.version;
            state.pending = Some(snapshot.clone());
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// end the delivery, a pending snapshot is dropped
    pub(super) fn close(&self) {
        let waker = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending = None;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(super) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Option<ResultSnapshot>> {
        let mut state = self.state.lock();
        if state.closed {
            return Poll::Ready(None);
        }
        match state.pending.take() {
            Some(snapshot) => Poll::Ready(Some(snapshot)),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// the pending snapshot, without waiting
    pub(super) fn take(&self) -> Option<ResultSnapshot> {
        let mut state = self.state.lock();
        if state.closed {
            None
        } else {
            state.pending.take()
        }
    }

    pub(super) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
