//! Ordered, re-entrancy-safe callback delivery
//!
//! Components that notify observers about their own state changes push an
//! event while still holding the lock that guards the change, release the
//! lock, then call [`EventQueue::dispatch`]. Events are therefore queued in
//! exactly the order the mutations happened, and no component lock is held
//! while user code runs.
//!
//! Only one thread delivers at a time. A thread that dispatches while another
//! thread is delivering leaves its events to that thread and returns at once;
//! the running round keeps popping until the queue is empty, so nothing is
//! stranded and order is kept. A callback that triggers a new event on the
//! same component (directly or through another call) does not recurse: the
//! event is queued and delivered by the outer loop right after the callback
//! returns.
//!
//! [`EventQueue::wait_idle`] is the only blocking call. It is meant for
//! teardown paths that must not return while someone else is still running a
//! callback.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use crate::sync::lock;

pub struct EventQueue<E> {
    inner: Mutex<Inner<E>>,
    idle: Condvar,
}

struct Inner<E> {
    pending: VecDeque<E>,
    drainer: Option<ThreadId>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                drainer: None,
            }),
            idle: Condvar::new(),
        }
    }

    /// Queue an event without delivering it.
    pub fn push(&self, event: E) {
        lock(&self.inner).pending.push_back(event);
    }

    /// Deliver all queued events, oldest first. Returns without delivering
    /// anything if another thread, or an outer call on this one, is already
    /// delivering.
    pub fn dispatch(&self, mut deliver: impl FnMut(E)) {
        let me = thread::current().id();
        let mut inner = lock(&self.inner);
        if inner.drainer.is_some() {
            return;
        }
        inner.drainer = Some(me);
        let _round = DrainRound { queue: self, me };

        loop {
            // the drainer is cleared under the same lock hold that saw the
            // queue empty, so a concurrent push is either popped here or
            // finds no drainer and delivers it itself
            let Some(event) = inner.pending.pop_front() else {
                inner.drainer = None;
                break;
            };
            drop(inner);
            deliver(event);
            inner = lock(&self.inner);
        }
        drop(inner);
        self.idle.notify_all();
    }

    /// Block until no other thread is delivering. Returns at once when called
    /// from inside a callback of this queue.
    pub fn wait_idle(&self) {
        let me = thread::current().id();
        let mut inner = lock(&self.inner);
        while inner.drainer.is_some_and(|id| id != me) {
            inner = self
                .idle
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        lock(&self.inner).pending.len()
    }
}

/// Releases the queue if a callback panics mid-round.
struct DrainRound<'q, E> {
    queue: &'q EventQueue<E>,
    me: ThreadId,
}

impl<E> Drop for DrainRound<'_, E> {
    fn drop(&mut self) {
        let mut inner = lock(&self.queue.inner);
        if inner.drainer == Some(self.me) {
            inner.drainer = None;
            drop(inner);
            self.queue.idle.notify_all();
        }
    }
}
