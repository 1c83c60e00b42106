//! Timer ABI types: ids, flags, and the tick type.

use bitflags::bitflags;

/// Monotonic hardware tick count. `T::MAX` is the "never" sentinel.
pub type Tick = u64;

/// Opaque, stable-across-migration timer handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u32);

impl TimerId {
    pub const INVALID: TimerId = TimerId(u32::MAX);
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TimerFlags: u16 {
        /// Not currently linked into any wheel.
        const DEQUEUED = 1 << 0;
        /// Reloads on expiry instead of being consumed.
        const PERIODIC = 1 << 1;
        /// Set for the duration of the handler invocation.
        const FIRED    = 1 << 2;
        /// Tracks the realtime clock; re-sorted on `adjust_all`.
        const REALTIME = 1 << 3;
        /// The handler requested no reload even though `PERIODIC` is set.
        const KILLED   = 1 << 4;
        /// Non-blocking start: fail instead of waiting for wheel capacity.
        const NOBLOCK  = 1 << 5;
        /// Bound to the host device's native tick; see host-tick deferral.
        const HOST_TICK = 1 << 6;
    }
}

/// Mode used to interpret the `expiry` argument to `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutMode {
    /// `expiry` is ticks from now, measured against the monotonic clock.
    Relative,
    /// `expiry` is an absolute monotonic tick count.
    AbsoluteMonotonic,
    /// `expiry` is an absolute tick count against the realtime clock.
    AbsoluteRealtime,
}
