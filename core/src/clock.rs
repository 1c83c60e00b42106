//! Clock source: monotonic tick counter, ns/tick conversion, and the
//! realtime offset. The hardware itself is an external collaborator —
//! [`ClockDriver`] is the capability record the core is handed at
//! construction time, generalizing the teacher's `define_service!`
//! struct-of-function-pointers pattern into a trait object so a
//! `Nucleus` can own one instead of reaching into a process-global
//! static (see DESIGN.md).

use core::sync::atomic::{AtomicI64, Ordering};

use cadence_abi::timer::Tick;

/// Downward-facing interface from the core to the platform timer
/// hardware. Implementations own the actual oneshot/calibration logic;
/// the core only ever calls through this trait.
pub trait ClockDriver: Send + Sync {
    /// Current monotonic tick count. Never decreases.
    fn read_raw(&self) -> Tick;
    /// Program the next hardware shot for the given absolute tick.
    fn program_shot(&self, deadline: Tick);
    /// Disarm the hardware timer (no timers pending).
    fn disarm(&self);
    /// Fixed-point (mult, shift) pair such that
    /// `ticks = (ns * mult) >> shift`.
    fn mult_shift(&self) -> (u64, u8);
}

/// Monotonic/realtime offset bookkeeping. Does not itself own a
/// [`ClockDriver`] — every method takes one, so a `ClockSource` can be
/// reused across drivers in tests.
pub struct ClockSource {
    realtime_offset: AtomicI64,
}

impl ClockSource {
    pub const fn new() -> Self {
        Self {
            realtime_offset: AtomicI64::new(0),
        }
    }

    pub fn ns_to_ticks(&self, driver: &dyn ClockDriver, ns: u64) -> Tick {
        let (mult, shift) = driver.mult_shift();
        (((ns as u128) * (mult as u128)) >> shift) as Tick
    }

    pub fn ticks_to_ns(&self, driver: &dyn ClockDriver, ticks: Tick) -> u64 {
        let (mult, shift) = driver.mult_shift();
        (((ticks as u128) << shift) / (mult as u128)) as u64
    }

    pub fn monotonic(&self, driver: &dyn ClockDriver) -> Tick {
        driver.read_raw()
    }

    pub fn realtime(&self, driver: &dyn ClockDriver) -> Tick {
        let raw = driver.read_raw() as i64;
        (raw + self.realtime_offset.load(Ordering::Relaxed)).max(0) as Tick
    }

    pub fn realtime_offset(&self) -> i64 {
        self.realtime_offset.load(Ordering::Relaxed)
    }

    /// Shift the realtime offset by `delta` ticks. The caller is
    /// responsible for re-sorting `REALTIME` timers afterward (see
    /// `TimerWheelSet::adjust_all`), which is why this only touches the
    /// offset itself.
    pub fn shift_offset(&self, delta: i64) {
        self.realtime_offset.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Default for ClockSource {
    fn default() -> Self {
        Self::new()
    }
}
