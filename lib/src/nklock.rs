//! The nucleus lock: a non-reentrant ticket lock serializing mutation of
//! timer wheels, wait objects, and IRQ chains.
//!
//! Unlike the platform spinlocks this is generalized from, `NkLock` does
//! not disable hardware interrupts — the core never runs on bare metal
//! by itself, it is always embedded behind a `ClockDriver`/`Scheduler`
//! pair supplied by the host, and the host is responsible for routing
//! its own IRQ context through the same lock as thread context (see the
//! concurrency model notes). This keeps the lock usable from a plain
//! hosted `std` test binary with real OS threads.
//!
//! FIFO fairness and poisoning semantics are preserved from the
//! platform ticket lock this is modeled on.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// A ticket-lock mutex with panic-recovery poisoning, minus hardware
/// interrupt masking.
pub struct NkLock<T> {
    next_ticket: AtomicU16,
    now_serving: AtomicU16,
    poisoned: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for NkLock<T> {}
unsafe impl<T: Send> Sync for NkLock<T> {}

pub struct NkLockGuard<'a, T> {
    lock: &'a NkLock<T>,
}

impl<T> NkLock<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            next_ticket: AtomicU16::new(0),
            now_serving: AtomicU16::new(0),
            poisoned: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Force the lock open without running a guard's `Drop`.
    ///
    /// # Safety
    /// Caller must ensure no code is concurrently executing with this
    /// lock held and that the protected data is consistent or will be
    /// reinitialized before further use.
    #[inline]
    pub unsafe fn force_unlock(&self) {
        self.now_serving
            .store(self.next_ticket.load(Ordering::Relaxed), Ordering::Release);
    }

    /// Like `force_unlock`, but also marks the lock poisoned.
    ///
    /// # Safety
    /// Same requirements as `force_unlock`.
    #[inline]
    pub unsafe fn poison_unlock(&self) {
        self.poisoned.store(true, Ordering::Release);
        self.now_serving
            .store(self.next_ticket.load(Ordering::Relaxed), Ordering::Release);
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    #[inline]
    pub fn clear_poison(&self) {
        self.poisoned.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lock(&self) -> NkLockGuard<'_, T> {
        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        loop {
            let serving = self.now_serving.load(Ordering::Acquire);
            if serving == my_ticket {
                break;
            }
            let distance = my_ticket.wrapping_sub(serving) as u32;
            for _ in 0..distance.min(64) {
                spin_loop();
            }
        }
        NkLockGuard { lock: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<NkLockGuard<'_, T>> {
        let current = self.now_serving.load(Ordering::Relaxed);
        if self
            .next_ticket
            .compare_exchange(
                current,
                current.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            Some(NkLockGuard { lock: self })
        } else {
            None
        }
    }
}

impl<T> Deref for NkLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for NkLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for NkLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.now_serving.fetch_add(1, Ordering::Release);
    }
}
