//! Live sync channel: fan-out of the latest result snapshot to observers.
//!
//! The channel keeps the snapshot of the newest tally it was given and one
//! delivery [`slot`] per subscriber. A subscriber starts from the latest
//! snapshot and then receives newer ones only; snapshots produced faster
//! than it takes them are coalesced into the newest.
//!
//! Committed tallies come with the revision of their document. A newer
//! revision whose counts went down means the record was reset: the channel
//! restarts as for a new voting period.

mod slot;

use self::slot::Slot;
use crate::error::ChannelDisconnected;
use futures::stream::{FusedStream, Stream};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tally_core::{PercentageBasis, ResultSnapshot, Tally};
use tally_store::{Revision, TallyListener};

/// Identifies a subscription, to end it with [`LiveSync::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

#[derive(Clone)]
pub struct LiveSync {
    shared: Arc<Shared>,
}

struct Shared {
    basis: PercentageBasis,
    latest: RwLock<Latest>,
    subscribers: Mutex<HashMap<SubscriptionHandle, Arc<Slot>>>,
    next_handle: AtomicU64,
    closed: AtomicBool,
}

struct Latest {
    snapshot: ResultSnapshot,
    /// newest document revision committed, kept across restarts
    revision: Option<Revision>,
}

impl Shared {
    fn remove(&self, handle: SubscriptionHandle) -> bool {
        match self.subscribers.lock().remove(&handle) {
            Some(slot) => {
                slot.close();
                true
            }
            None => false,
        }
    }
}

impl LiveSync {
    pub fn new(initial: &Tally, basis: PercentageBasis) -> Self {
        Self {
            shared: Arc::new(Shared {
                basis,
                latest: RwLock::new(Latest {
                    snapshot: ResultSnapshot::compute(initial, basis),
                    revision: None,
                }),
                subscribers: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn basis(&self) -> PercentageBasis {
        self.shared.basis
    }

    /// snapshot of the newest tally published so far
    pub fn latest(&self) -> ResultSnapshot {
        self.shared.latest.read().snapshot.clone()
    }

    pub fn subscribers(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// recompute the snapshot of `tally` and push it to every subscriber
    ///
    /// Tallies that are not newer than the latest published one are
    /// ignored, so the same tally may be published from several sources.
    /// Returns whether the tally was newer.
    pub fn publish(&self, tally: &Tally) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        if tally.version() <= self.shared.latest.read().snapshot.version {
            return false;
        }

        let snapshot = ResultSnapshot::compute(tally, self.shared.basis);
        {
            let mut latest = self.shared.latest.write();
            if snapshot.version <= latest.snapshot.version {
                return false;
            }
            latest.snapshot = snapshot.clone();
        }

        let slots: Vec<Arc<Slot>> = self.shared.subscribers.lock().values().cloned().collect();
        for slot in slots {
            slot.offer(&snapshot);
        }
        true
    }

    /// take the tally committed at `revision` of the backing document
    ///
    /// Stale revisions are ignored. When a count went down the record was
    /// reset, by this process or another one: every subscription ends and
    /// the channel starts over from `tally`. Otherwise the tally is
    /// published if newer. Returns whether the latest snapshot changed.
    pub fn commit(&self, tally: &Tally, revision: Revision) -> bool {
        let mut subscribers = self.shared.subscribers.lock();
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut latest = self.shared.latest.write();
        if latest.revision.map_or(false, |seen| revision <= seen) {
            return false;
        }
        latest.revision = Some(revision);

        let was_reset = tally
            .counts()
            .iter()
            .zip(&latest.snapshot.counts)
            .any(|(now, before)| now < before);
        if !was_reset && tally.version() <= latest.snapshot.version {
            return false;
        }

        let snapshot = ResultSnapshot::compute(tally, self.shared.basis);
        latest.snapshot = snapshot.clone();
        drop(latest);

        if was_reset {
            tracing::info!(%revision, "tally record was reset, live results start over");
            for (_, slot) in subscribers.drain() {
                slot.close();
            }
        } else {
            for slot in subscribers.values() {
                slot.offer(&snapshot);
            }
        }
        true
    }

    /// start observing the results
    ///
    /// The returned snapshot is the latest one; the stream then yields
    /// strictly newer snapshots until the subscription ends.
    pub fn subscribe(&self) -> Result<(ResultSnapshot, Subscription), ChannelDisconnected> {
        let mut subscribers = self.shared.subscribers.lock();
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ChannelDisconnected);
        }

        let handle = SubscriptionHandle(self.shared.next_handle.fetch_add(1, Ordering::Relaxed));
        let initial = self.shared.latest.read().snapshot.clone();
        let slot = Arc::new(Slot::new(initial.version));
        subscribers.insert(handle, slot.clone());
        drop(subscribers);

        tracing::debug!(?handle, version = %initial.version, "new subscriber");
        Ok((
            initial,
            Subscription {
                handle,
                slot,
                shared: Arc::downgrade(&self.shared),
            },
        ))
    }

    /// end a subscription; its stream yields nothing more. Returns false if
    /// the subscription had already ended.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.shared.remove(handle);
        if removed {
            tracing::debug!(?handle, "unsubscribed");
        }
        removed
    }

    /// end every current subscription and start over from `tally`, which
    /// may be older than the latest published one (new voting period)
    pub fn restart(&self, tally: &Tally) {
        let mut subscribers = self.shared.subscribers.lock();
        self.shared.latest.write().snapshot = ResultSnapshot::compute(tally, self.shared.basis);
        for (_, slot) in subscribers.drain() {
            slot.close();
        }
    }

    /// end every subscription and refuse new ones
    pub fn close(&self) {
        let mut subscribers = self.shared.subscribers.lock();
        self.shared.closed.store(true, Ordering::Release);
        for (_, slot) in subscribers.drain() {
            slot.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl TallyListener for LiveSync {
    fn tally_changed(&self, tally: Tally, revision: Revision) {
        self.commit(&tally, revision);
    }
}

/// Stream of the snapshots of one observer. Dropping it unsubscribes.
pub struct Subscription {
    handle: SubscriptionHandle,
    slot: Arc<Slot>,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// the pending snapshot, if a newer one arrived since the last one
    /// taken
    pub fn try_next(&self) -> Option<ResultSnapshot> {
        self.slot.take()
    }
}

impl Stream for Subscription {
    type Item = ResultSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.slot.poll_take(cx)
    }
}

impl FusedStream for Subscription {
    fn is_terminated(&self) -> bool {
        self.slot.is_closed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.handle);
        }
    }
}
