//! Test fakes shared by the scenario and property suites: a manually
//! steppable [`FakeClock`] and a [`TestScheduler`] backed by real OS
//! threads, mirroring the role the teacher's `slopos-tests` crate plays
//! for its own platform drivers.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use cadence_abi::sched::Priority;
use cadence_abi::synch::{BlockReason, ThreadId, ThreadMode, WakeInfo};
use cadence_abi::timer::Tick;
use cadence_core::ClockDriver;
use cadence_core::Scheduler;

/// A clock driver with no real hardware behind it: `read_raw` returns
/// whatever the test last set, `program_shot`/`disarm` just record the
/// last call for assertions.
pub struct FakeClock {
    now: AtomicU64,
    last_shot: AtomicU64,
    armed: AtomicBool,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
            last_shot: AtomicU64::new(u64::MAX),
            armed: AtomicBool::new(false),
        }
    }

    pub fn set(&self, tick: Tick) {
        self.now.store(tick, Ordering::SeqCst);
    }

    pub fn last_shot(&self) -> Option<Tick> {
        if self.armed.load(Ordering::SeqCst) {
            Some(self.last_shot.load(Ordering::SeqCst))
        } else {
            None
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockDriver for FakeClock {
    fn read_raw(&self) -> Tick {
        self.now.load(Ordering::SeqCst)
    }
    fn program_shot(&self, deadline: Tick) {
        self.last_shot.store(deadline, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }
    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
    fn mult_shift(&self) -> (u64, u8) {
        (1, 0)
    }
}

thread_local! {
    static CURRENT: Cell<u32> = const { Cell::new(u32::MAX) };
}

/// Bind the calling OS thread to a [`ThreadId`] for the remainder of its
/// lifetime. Call once at the top of every spawned test thread before
/// touching a [`Nucleus`](cadence_core::Nucleus) built on [`TestScheduler`].
pub fn bind_current_thread(id: ThreadId) {
    CURRENT.with(|c| c.set(id.0));
}

/// A scheduler fake that blocks real OS threads on a condvar, so
/// multi-thread scenario tests exercise genuine suspend/wake handoffs
/// instead of a single-threaded stand-in.
pub struct TestScheduler {
    base_priority: Mutex<HashMap<u32, Priority>>,
    effective_priority: Mutex<HashMap<u32, Priority>>,
    mode: Mutex<HashMap<u32, ThreadMode>>,
    wake_info: Mutex<HashMap<u32, WakeInfo>>,
    cv: Condvar,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self {
            base_priority: Mutex::new(HashMap::new()),
            effective_priority: Mutex::new(HashMap::new()),
            mode: Mutex::new(HashMap::new()),
            wake_info: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
        }
    }

    pub fn set_priority(&self, thread: ThreadId, priority: Priority) {
        self.base_priority.lock().unwrap().insert(thread.0, priority);
    }

    pub fn set_mode(&self, thread: ThreadId, mode: ThreadMode) {
        self.mode.lock().unwrap().insert(thread.0, mode);
    }

    pub fn effective_priority(&self, thread: ThreadId) -> Priority {
        *self.effective_priority.lock().unwrap().get(&thread.0).unwrap_or(&0)
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TestScheduler {
    fn current_thread(&self) -> ThreadId {
        ThreadId(CURRENT.with(|c| c.get()))
    }

    fn base_priority_of(&self, thread: ThreadId) -> Priority {
        *self.base_priority.lock().unwrap().get(&thread.0).unwrap_or(&0)
    }

    fn mode_of(&self, thread: ThreadId) -> ThreadMode {
        *self.mode.lock().unwrap().get(&thread.0).unwrap_or(&ThreadMode::Primary)
    }

    fn set_effective_priority(&self, thread: ThreadId, priority: Priority) {
        self.effective_priority.lock().unwrap().insert(thread.0, priority);
    }

    fn suspend(&self, thread: ThreadId, _reason: BlockReason, timeout_ticks: Option<Tick>) -> WakeInfo {
        let mut guard = self.wake_info.lock().unwrap();
        match timeout_ticks {
            None => {
                while !guard.contains_key(&thread.0) {
                    guard = self.cv.wait(guard).unwrap();
                }
                guard.remove(&thread.0).unwrap()
            }
            Some(ticks) => {
                // Ticks stand in for wall-clock milliseconds in this
                // host test harness, capped so a slow CI box never
                // turns a short test timeout into a long stall.
                let budget = Duration::from_millis(ticks.min(200));
                loop {
                    if let Some(info) = guard.remove(&thread.0) {
                        return info;
                    }
                    let (next_guard, result) = self.cv.wait_timeout(guard, budget).unwrap();
                    guard = next_guard;
                    if result.timed_out() {
                        return guard.remove(&thread.0).unwrap_or(WakeInfo::TIMEO);
                    }
                }
            }
        }
    }

    fn wake(&self, thread: ThreadId, info: WakeInfo) {
        self.wake_info.lock().unwrap().insert(thread.0, info);
        self.cv.notify_all();
    }
}
