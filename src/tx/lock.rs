//! Per-record serialization lock
//!
//! A FIFO ticket queue over the record's mutable fields. Callers are served in
//! the order they asked for the lock, so back-to-back boosts and cancels apply
//! in submission order. The handle releases on drop, which covers every exit
//! path including `?` propagation.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// FIFO lock guarding a value
pub struct SerialLock<T> {
    inner: Arc<Mutex<T>>,
    next_ticket: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

/// Exclusive access granted by [`SerialLock::acquire`]
pub struct LockHandle<T> {
    guard: OwnedMutexGuard<T>,
    ticket: Ticket,
}

/// Place in the queue; counted in `in_flight` from creation until dropped,
/// whether or not the lock was ever granted
struct Ticket {
    number: u64,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        trace!(ticket = self.number, "ticket released");
    }
}

impl<T> SerialLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
            next_ticket: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take a ticket and wait until every earlier ticket has been released
    pub async fn acquire(&self) -> LockHandle<T> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let ticket = Ticket {
            number: self.next_ticket.fetch_add(1, Ordering::SeqCst),
            in_flight: self.in_flight.clone(),
        };
        trace!(ticket = ticket.number, "waiting for lock");

        // tokio's mutex grants waiters in request order; a waiter dropped
        // here gives its ticket back
        let guard = self.inner.clone().lock_owned().await;

        LockHandle { guard, ticket }
    }

    /// Number of tickets taken and not yet released, without joining the queue
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// True when no holder or waiter exists
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}

impl<T> LockHandle<T> {
    /// Position in submission order
    pub fn ticket(&self) -> u64 {
        self.ticket.number
    }

    /// Release explicitly; dropping the handle has the same effect
    pub fn release(self) {}
}

impl<T> Deref for LockHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LockHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
