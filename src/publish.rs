//! Latest-value publication of detection sets.
//!
//! A single slot holds the most recent `DetectionSet` behind an `Arc`. The one
//! publisher swaps the whole `Arc` under a lock, so readers either see the previous
//! set or the new one, never a partially built set. Readers take snapshots and may
//! block until a newer version arrives.
//!
//! Closing the slot models a torn-down presentation surface: later publishes are
//! discarded and waiting readers wake up.

use serde::Deserialize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::frame::SurfaceSize;
use crate::pipeline::DetectionSet;

/// How publishes from out-of-order inference results are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Drop a set whose frame sequence is older than the one already published.
    #[default]
    MonotonicFrames,
    /// Whatever is published last is shown.
    LatestPublishWins,
}

/// Outcome of a publish call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishStatus {
    Published { version: u64 },
    /// Older than the current set; discarded.
    Stale,
    /// The slot has been closed; discarded.
    Closed,
}

struct Slot {
    current: Arc<DetectionSet>,
    version: u64,
    closed: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
    policy: OrderingPolicy,
}

impl Shared {
    // Slot updates are single assignments, so a poisoned lock still holds a whole value.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let mut slot = self.lock();
        if !slot.closed {
            slot.closed = true;
            drop(slot);
            self.changed.notify_all();
        }
    }
}

/// Create a slot holding an empty set for `surface`.
pub fn channel(
    surface: SurfaceSize,
    policy: OrderingPolicy,
) -> (DetectionPublisher, DetectionSubscriber) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            current: Arc::new(DetectionSet::empty(0, surface)),
            version: 0,
            closed: false,
        }),
        changed: Condvar::new(),
        policy,
    });
    (
        DetectionPublisher {
            shared: shared.clone(),
        },
        DetectionSubscriber { shared },
    )
}

// ----------------------------------------------------------------------------
// Publisher
// ----------------------------------------------------------------------------

/// The single writer. Dropping it closes the slot.
pub struct DetectionPublisher {
    shared: Arc<Shared>,
}

impl DetectionPublisher {
    /// Replace the current set with `set`.
    pub fn publish(&self, set: DetectionSet) -> PublishStatus {
        let mut slot = self.shared.lock();
        if slot.closed {
            return PublishStatus::Closed;
        }
        if self.shared.policy == OrderingPolicy::MonotonicFrames
            && set.frame_sequence < slot.current.frame_sequence
        {
            return PublishStatus::Stale;
        }
        slot.current = Arc::new(set);
        slot.version += 1;
        let version = slot.version;
        drop(slot);
        self.shared.changed.notify_all();
        PublishStatus::Published { version }
    }

    /// Close the slot. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// A handle that can close the slot from another thread while this publisher is
    /// busy, e.g. blocked in inference.
    pub fn closer(&self) -> SlotCloser {
        SlotCloser {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for DetectionPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Close-only handle to a slot.
#[derive(Clone)]
pub struct SlotCloser {
    shared: Arc<Shared>,
}

impl SlotCloser {
    pub fn close(&self) {
        self.shared.close();
    }
}

// ----------------------------------------------------------------------------
// Subscriber
// ----------------------------------------------------------------------------

/// A reader of the slot. Cheap to clone.
#[derive(Clone)]
pub struct DetectionSubscriber {
    shared: Arc<Shared>,
}

impl DetectionSubscriber {
    /// Latest published set.
    pub fn snapshot(&self) -> Arc<DetectionSet> {
        self.shared.lock().current.clone()
    }

    /// Latest published set with its version. Version 0 is the initial empty set.
    pub fn versioned(&self) -> (u64, Arc<DetectionSet>) {
        let slot = self.shared.lock();
        (slot.version, slot.current.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Block until a version newer than `seen` is published.
    ///
    /// Returns `None` on timeout, or when the slot closes without a newer version.
    pub fn wait_newer(&self, seen: u64, timeout: Duration) -> Option<(u64, Arc<DetectionSet>)> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.lock();
        loop {
            if slot.version > seen {
                return Some((slot.version, slot.current.clone()));
            }
            if slot.closed {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .shared
                .changed
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
