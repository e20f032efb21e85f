//! Trailing-edge debounce of reading delivery.
//!
//! At most one delivery is pending at a time. Every [`Debouncer::submit`]
//! replaces the pending one, so a burst of updates collapses into a single
//! delivery of the latest value once the source has been quiet for the whole
//! window. This is not a throttle: a source that never pauses is never
//! delivered. Periodic sampling lives in [`crate::logger`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Default)]
struct Slot {
    /// Bumped on every submit and cancel; a timer only fires if its
    /// generation is still current when it wakes.
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    closed: AtomicBool,
    /// Thread currently running a callback, if any.
    firing_on: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn is_firing_here(&self) -> bool {
        *lock(&self.firing_on) == Some(thread::current().id())
    }
}

/// Marks the current thread as delivering until dropped.
struct Firing<'a>(&'a Shared);

impl<'a> Firing<'a> {
    fn enter(shared: &'a Shared) -> Self {
        *lock(&shared.firing_on) = Some(thread::current().id());
        Self(shared)
    }
}

impl Drop for Firing<'_> {
    fn drop(&mut self) {
        *lock(&self.0.firing_on) = None;
    }
}

/// Single-slot debouncer. Clones share the same slot.
///
/// Callbacks run while the slot lock is held, which makes firing atomic with
/// respect to [`submit`](Self::submit), [`cancel`](Self::cancel) and
/// [`shutdown`](Self::shutdown) called from other tasks. A callback may call
/// `cancel`, `shutdown` or `is_closed` on the same debouncer, but not
/// `submit` or `is_pending`.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback(value)` after `deliver_after`, superseding any
    /// pending delivery. The superseded value is dropped, never delivered.
    ///
    /// A zero `deliver_after` delivers immediately, on the calling thread.
    /// Otherwise this must be called from within a tokio runtime.
    pub fn submit<T, F>(&self, value: T, deliver_after: Duration, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let mut slot = lock(&self.shared.slot);
        if self.is_closed() {
            trace!("Debouncer closed, dropping submitted value");
            return;
        }

        if deliver_after.is_zero() {
            Self::cancel_locked(&mut slot);
            let _firing = Firing::enter(&self.shared);
            callback(value);
            return;
        }

        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let shared = Arc::clone(&self.shared);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deliver_after).await;

            let mut slot = lock(&shared.slot);
            if shared.closed.load(Ordering::SeqCst) || slot.generation != generation {
                return;
            }
            slot.pending = None;
            let _firing = Firing::enter(&shared);
            callback(value);
        });

        slot.pending = Some(timer);
    }

    /// Discard the pending delivery, if any.
    ///
    /// Once this returns, no previously submitted value will be delivered.
    pub fn cancel(&self) {
        // Inside a callback the slot is already ours and nothing is pending
        if self.shared.is_firing_here() {
            return;
        }
        let mut slot = lock(&self.shared.slot);
        Self::cancel_locked(&mut slot);
    }

    /// Cancel the pending delivery and ignore every later submit.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if self.shared.is_firing_here() {
            trace!("Debouncer shut down from its own callback");
            return;
        }
        let mut slot = lock(&self.shared.slot);
        Self::cancel_locked(&mut slot);
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.shared.slot).pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn cancel_locked(slot: &mut Slot) {
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(timer) = slot.pending.take() {
            trace!("Cancelling pending delivery");
            timer.abort();
        }
    }
}
