//! Wait-object ABI types: ids, flags, wake info.

use bitflags::bitflags;

/// Opaque handle to a wait object (mutex, semaphore, condvar-like queue).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

/// Opaque handle to a thread, looked up through the `Scheduler` capability
/// record. Never dereferenced directly by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SynchFlags: u16 {
        /// Waiters are ordered by priority instead of FIFO.
        const PRIO_ORDER     = 1 << 0;
        /// The object has a concept of ownership (mutex-like).
        const OWNER_TRACKED  = 1 << 1;
        /// Priority inheritance is active for this object.
        const PI_ENABLED     = 1 << 2;
        /// Waiters are never reordered even if `PRIO_ORDER` is set.
        const DISABLE_REORDER = 1 << 3;
        /// Visible to external introspection (debuggers, `/proc`-style dumps).
        const EXPORTED       = 1 << 4;
        /// At least one waiter queued behind the current owner.
        const CLAIMED        = 1 << 5;
        /// The owner's effective priority is currently raised on this object's account.
        const BOOSTED        = 1 << 6;
    }
}

bitflags! {
    /// Per-thread state bits relevant to the synchronization core.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ThreadStateBits: u32 {
        const PEND   = 1 << 0;
        const RELAX  = 1 << 1;
        const TRAPSW = 1 << 2;
        const WEAK   = 1 << 3;
        const BOOST  = 1 << 4;
        const ROBBED = 1 << 5;
        const WAKEN  = 1 << 6;
    }
}

bitflags! {
    /// Per-thread info bits describing how the last wait ended.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WakeInfo: u32 {
        const RMID  = 1 << 0;
        const TIMEO = 1 << 1;
        const BREAK = 1 << 2;
        const SWREP = 1 << 3;
    }
}

/// The scheduling mode a thread is currently running under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadMode {
    /// Scheduled by the real-time core.
    Primary,
    /// Scheduled by the host OS; cannot own PI/PP objects.
    Relaxed,
}

/// Why a thread is being suspended, passed to `Scheduler::suspend`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    WaitObject(ObjectId),
    Timer,
    Generic,
}
