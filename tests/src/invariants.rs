//! Property tests for the universal invariants a well-formed nucleus
//! must hold after every public operation. Each property drives
//! `SynchCore`/`TimerWheelSet` directly with randomized inputs rather
//! than through a full `Nucleus`, since the invariants are structural
//! and don't need a real suspend/wake round trip.

use proptest::prelude::*;

use cadence_abi::sched::Priority;
use cadence_abi::synch::{SynchFlags, ThreadId};
use cadence_abi::timer::TimerFlags;
use cadence_core::timer::TimerWheelSet;
use cadence_core::{AcquireOutcome, Scheduler, SynchCore};

use crate::harness::{bind_current_thread, FakeClock, TestScheduler};

proptest! {
    /// Invariant 6: a priority-ordered pendq yields waiters in
    /// non-increasing priority order as the owner releases one at a time.
    #[test]
    fn pendq_releases_in_non_increasing_priority_order(priorities in prop::collection::vec(0u32..100, 1..6)) {
        let sched = TestScheduler::new();
        for (i, p) in priorities.iter().enumerate() {
            sched.set_priority(ThreadId(i as u32), *p);
        }
        let mut core = SynchCore::new();
        let id = core.create(SynchFlags::OWNER_TRACKED | SynchFlags::PRIO_ORDER, 0);

        bind_current_thread(ThreadId(0));
        matches!(core.begin_acquire(id, &sched).unwrap(), AcquireOutcome::Acquired);
        for i in 1..priorities.len() {
            bind_current_thread(ThreadId(i as u32));
            matches!(core.begin_acquire(id, &sched).unwrap(), AcquireOutcome::MustWait);
        }

        let mut seen: Vec<Priority> = Vec::new();
        let mut current_owner = 0u32;
        loop {
            bind_current_thread(ThreadId(current_owner));
            core.release(id, &sched).unwrap();
            match core.owner_of(id) {
                Some(next) => {
                    seen.push(sched.base_priority_of(next));
                    current_owner = next.0;
                }
                None => break,
            }
        }
        for w in seen.windows(2) {
            prop_assert!(w[0] >= w[1]);
        }
    }

    /// Invariant 3: owner presence and a live fastlock handle always
    /// agree, across an arbitrary sequence of acquire/release calls.
    #[test]
    fn owner_and_fastlock_presence_always_agree(priorities in prop::collection::vec(0u32..100, 1..6)) {
        let sched = TestScheduler::new();
        for (i, p) in priorities.iter().enumerate() {
            sched.set_priority(ThreadId(i as u32), *p);
        }
        let mut core = SynchCore::new();
        let id = core.create(SynchFlags::OWNER_TRACKED, 0);

        for i in 0..priorities.len() {
            bind_current_thread(ThreadId(i as u32));
            let _ = core.begin_acquire(id, &sched);
            prop_assert_eq!(
                core.owner_of(id).is_some(),
                core.fastlock_of(id).unwrap() != cadence_abi::fastlock::NO_HANDLE
            );
        }
        loop {
            let owner = match core.owner_of(id) {
                Some(o) => o,
                None => break,
            };
            bind_current_thread(owner);
            core.release(id, &sched).unwrap();
            prop_assert_eq!(
                core.owner_of(id).is_some(),
                core.fastlock_of(id).unwrap() != cadence_abi::fastlock::NO_HANDLE
            );
        }
    }

    /// Invariant 7: a PI-boosted owner's effective priority is never
    /// below its own base priority, for any waiter priority.
    #[test]
    fn boosted_effective_priority_never_drops_below_base(owner_prio in 0u32..50, waiter_prio in 0u32..50) {
        let sched = TestScheduler::new();
        sched.set_priority(ThreadId(0), owner_prio);
        sched.set_priority(ThreadId(1), waiter_prio);
        let mut core = SynchCore::new();
        let id = core.create(SynchFlags::OWNER_TRACKED | SynchFlags::PI_ENABLED, 0);

        bind_current_thread(ThreadId(0));
        matches!(core.begin_acquire(id, &sched).unwrap(), AcquireOutcome::Acquired);
        bind_current_thread(ThreadId(1));
        matches!(core.begin_acquire(id, &sched).unwrap(), AcquireOutcome::MustWait);

        prop_assert!(sched.effective_priority(ThreadId(0)) >= owner_prio);
    }

    /// Invariant 9: the per-CPU wheel's programmed hardware deadline
    /// always equals the earliest pending timer, or the driver is
    /// disarmed when the wheel is empty.
    #[test]
    fn wheel_head_matches_programmed_deadline(expiries in prop::collection::vec(1u64..1000, 1..8)) {
        let driver = FakeClock::new();
        let mut wheels = TimerWheelSet::new(1);
        for &e in &expiries {
            wheels.start(0, e, 0, TimerFlags::empty(), Box::new(|_, _| {}), &driver).unwrap();
        }
        let min = *expiries.iter().min().unwrap();
        prop_assert_eq!(driver.last_shot(), Some(min));
        prop_assert_eq!(wheels.head_expiry(0), Some(min));
    }
}
