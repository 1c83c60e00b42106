//! A one-shot "has this run yet" gate for static, const-constructible
//! one-time setup guards.
//!
//! The teacher's own `init_flag.rs` (referenced by its `core/src/irq.rs`
//! as `static IRQ_SYSTEM_INIT: InitFlag = InitFlag::new();`) is not part
//! of the retrieved sources here; this is grounded instead on the
//! sibling `once_lock.rs`'s atomic state-machine idiom (CAS-guarded
//! `AtomicU8`, `Acquire`/`Release` ordering), simplified to a boolean
//! flag since callers here only need "did this already happen", not a
//! lazily-computed value.

use core::sync::atomic::{AtomicBool, Ordering};

/// A `const`-constructible one-shot flag.
pub struct InitFlag {
    done: AtomicBool,
}

impl InitFlag {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Mark the flag set. Returns `true` the first time this is called
    /// on a given instance, `false` on every call after.
    pub fn mark(&self) -> bool {
        self.done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
