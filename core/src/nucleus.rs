//! The nucleus: ties the clock source, timer wheel set, synchronization
//! core, semaphore table, and IRQ dispatcher together behind one
//! [`NkLock`], and owns the `ClockDriver`/`Scheduler` capability records
//! supplied by the host.
//!
//! Every public method that can block follows the same shape as the
//! `begin_*`/`finish_*` split in [`crate::synch`]: lock, mutate state,
//! drop the lock, call `Scheduler::suspend` if a wait is required,
//! re-lock, finish. The lock is never held across `suspend` (§5).

use alloc::boxed::Box;

use cadence_abi::errno::{CoreResult, Errno};
#[cfg(test)]
use cadence_abi::irq::IrqOutcome;
use cadence_abi::irq::{AttachToken, IrqMode};
use cadence_abi::synch::{BlockReason, ObjectId, SynchFlags, ThreadId, WakeInfo};
use cadence_abi::timer::{Tick, TimerFlags, TimerId};

use cadence_lib::NkLock;

use crate::clock::{ClockDriver, ClockSource};
use crate::config::IRQ_LINES;
use crate::irq::{IrqDispatcher, IrqHandlerFn};
use crate::sem::{SemFlags, SemId, SemTable};
use crate::synch::{AcquireOutcome, Scheduler, SynchCore};
use crate::timer::{TimerHandler, TimerRecord, TimerWheelSet};

struct Inner {
    clock: ClockSource,
    timers: TimerWheelSet,
    synch: SynchCore,
    sems: SemTable,
    irq: IrqDispatcher,
}

pub struct Nucleus {
    driver: Box<dyn ClockDriver>,
    sched: Box<dyn Scheduler>,
    inner: NkLock<Inner>,
}

impl Nucleus {
    pub fn new(num_cpus: usize, driver: Box<dyn ClockDriver>, sched: Box<dyn Scheduler>) -> Self {
        cadence_lib::klog_info!("cadence: nucleus initializing with {} cpus, {} irq lines", num_cpus, IRQ_LINES);
        Self {
            driver,
            sched,
            inner: NkLock::new(Inner {
                clock: ClockSource::new(),
                timers: TimerWheelSet::new(num_cpus),
                synch: SynchCore::new(),
                sems: SemTable::new(),
                irq: IrqDispatcher::new(IRQ_LINES),
            }),
        }
    }

    // ---- clock ----------------------------------------------------

    pub fn monotonic(&self) -> Tick {
        let guard = self.inner.lock();
        guard.clock.monotonic(&*self.driver)
    }

    pub fn realtime(&self) -> Tick {
        let guard = self.inner.lock();
        guard.clock.realtime(&*self.driver)
    }

    /// Step the realtime offset and resort affected timers (§4.2.2 /
    /// scenario S5). `delta` is in ticks.
    pub fn adjust_realtime(&self, delta: i64) {
        let mut guard = self.inner.lock();
        guard.clock.shift_offset(delta);
        guard.timers.adjust_all(delta, &*self.driver);
    }

    // ---- wait objects -----------------------------------------------

    pub fn create_synch(&self, flags: SynchFlags, ceiling: cadence_abi::sched::Priority) -> ObjectId {
        self.inner.lock().synch.create(flags, ceiling)
    }

    /// Owner-tracked acquire. Blocks the caller until the object is
    /// acquired, the wait is broken, or `timeout_ticks` elapses.
    pub fn acquire(&self, id: ObjectId, timeout_ticks: Option<Tick>) -> CoreResult<()> {
        let thread = self.sched.current_thread();
        let outcome = {
            let mut guard = self.inner.lock();
            guard.synch.begin_acquire(id, &*self.sched)?
        };
        match outcome {
            AcquireOutcome::Acquired => Ok(()),
            AcquireOutcome::MustWait => {
                let info = self
                    .sched
                    .suspend(thread, BlockReason::WaitObject(id), timeout_ticks);
                let mut guard = self.inner.lock();
                guard.synch.finish_acquire(id, thread, info)
            }
        }
    }

    pub fn release(&self, id: ObjectId) -> CoreResult<()> {
        self.inner.lock().synch.release(id, &*self.sched)
    }

    pub fn requeue(&self, id: ObjectId, thread: ThreadId) -> CoreResult<()> {
        self.inner.lock().synch.requeue(id, thread, &*self.sched)
    }

    /// Ownerless wait: enqueue on `id` and block until `wakeup_one`,
    /// `wakeup_many`, `flush`, or the timeout wakes this thread.
    pub fn sleep_on(&self, id: ObjectId, timeout_ticks: Option<Tick>) -> CoreResult<()> {
        let thread = self.sched.current_thread();
        {
            let mut guard = self.inner.lock();
            guard.synch.begin_sleep(id, &*self.sched)?;
        }
        let info = self
            .sched
            .suspend(thread, BlockReason::WaitObject(id), timeout_ticks);
        let mut guard = self.inner.lock();
        guard.synch.finish_sleep(id, thread);
        if info.contains(WakeInfo::RMID) || info.contains(WakeInfo::BREAK) {
            return Err(Errno::Broken);
        }
        if info.contains(WakeInfo::TIMEO) {
            return Err(Errno::Timeout);
        }
        Ok(())
    }

    pub fn wakeup_one(&self, id: ObjectId) -> CoreResult<()> {
        self.inner.lock().synch.wakeup_one(id, &*self.sched)
    }

    pub fn wakeup_many(&self, id: ObjectId) -> CoreResult<()> {
        self.inner.lock().synch.wakeup_many(id, &*self.sched)
    }

    pub fn flush(&self, id: ObjectId) -> CoreResult<()> {
        self.inner
            .lock()
            .synch
            .flush(id, WakeInfo::BREAK, &*self.sched)
    }

    pub fn destroy_synch(&self, id: ObjectId) -> CoreResult<()> {
        self.inner.lock().synch.destroy(id, &*self.sched)
    }

    pub fn forget(&self, thread: ThreadId) {
        self.inner.lock().synch.forget(thread, &*self.sched)
    }

    // ---- semaphores ---------------------------------------------------

    pub fn create_sem(&self, flags: SemFlags, initial: i64, cap: Option<i64>) -> SemId {
        let mut guard = self.inner.lock();
        let Inner { synch, sems, .. } = &mut *guard;
        sems.create(synch, flags, initial, cap)
    }

    pub fn sem_wait(&self, id: SemId, timeout_ticks: Option<Tick>) -> CoreResult<()> {
        let thread = self.sched.current_thread();
        let object = {
            let mut guard = self.inner.lock();
            let obj = match guard.sems.begin_wait(id)? {
                None => return Ok(()),
                Some(obj) => obj,
            };
            guard.synch.begin_sleep(obj, &*self.sched)?;
            obj
        };
        let info = self
            .sched
            .suspend(thread, BlockReason::WaitObject(object), timeout_ticks);
        let mut guard = self.inner.lock();
        guard.synch.finish_sleep(object, thread);
        SemTable::finish_wait(info)
    }

    pub fn sem_try_wait(&self, id: SemId) -> CoreResult<bool> {
        self.inner.lock().sems.try_take(id)
    }

    pub fn sem_signal(&self, id: SemId) -> CoreResult<()> {
        let mut guard = self.inner.lock();
        let Inner { synch, sems, .. } = &mut *guard;
        sems.signal(id, synch, &*self.sched)
    }

    pub fn sem_broadcast(&self, id: SemId) -> CoreResult<()> {
        let mut guard = self.inner.lock();
        let Inner { synch, sems, .. } = &mut *guard;
        sems.broadcast(id, synch, &*self.sched)
    }

    pub fn sem_destroy(&self, id: SemId) -> CoreResult<()> {
        let mut guard = self.inner.lock();
        let Inner { synch, sems, .. } = &mut *guard;
        sems.destroy(id, synch, &*self.sched)
    }

    pub fn sem_count(&self, id: SemId) -> CoreResult<i64> {
        self.inner.lock().sems.count(id)
    }

    // ---- timers ---------------------------------------------------

    pub fn timer_start(
        &self,
        cpu: usize,
        expiry: Tick,
        interval: Tick,
        flags: TimerFlags,
        handler: TimerHandler,
    ) -> CoreResult<TimerId> {
        self.inner
            .lock()
            .timers
            .start(cpu, expiry, interval, flags, handler, &*self.driver)
    }

    pub fn timer_stop(&self, cpu: usize, id: TimerId) -> CoreResult<()> {
        self.inner.lock().timers.stop(cpu, id, &*self.driver)
    }

    pub fn timer_migrate(&self, id: TimerId, from_cpu: usize, to_cpu: usize) -> CoreResult<()> {
        self.inner
            .lock()
            .timers
            .migrate(id, from_cpu, to_cpu, &*self.driver)
    }

    pub fn timer_record(&self, cpu: usize, id: TimerId) -> Option<TimerRecord> {
        self.inner.lock().timers.record_of(cpu, id)
    }

    /// Drive the per-CPU timer wheel forward to `now`. Called by the
    /// host from its clock interrupt handler, under the IRQ dispatch
    /// path (§4.5.3).
    pub fn timer_tick(&self, cpu: usize, now: Tick) {
        self.inner.lock().timers.tick(cpu, now, &*self.driver);
    }

    /// Ticks on `cpu` deferred because the only due timer was the
    /// host's own `HOST_TICK` placeholder (§4.2.2).
    pub fn timer_deferred_ticks(&self, cpu: usize) -> u64 {
        self.inner.lock().timers.deferred_ticks(cpu)
    }

    // ---- irq ---------------------------------------------------------

    pub fn irq_set_clock_line(&self, line: u16) {
        self.inner.lock().irq.set_clock_line(line);
    }

    /// Returns the line-level token needed by `irq_detach`, and the
    /// per-handler token identifying this specific registration within
    /// the line's chain (several handlers may share a line).
    pub fn irq_attach(&self, line: u16, mode: IrqMode, handler: IrqHandlerFn) -> CoreResult<(AttachToken, u32)> {
        self.inner.lock().irq.attach(line, mode, handler)
    }

    pub fn irq_detach(&self, tok: AttachToken, handler_token: u32) -> CoreResult<()> {
        self.inner.lock().irq.detach(tok, handler_token)
    }

    pub fn irq_dispatch(&self, line: u16, now_fn: impl FnMut() -> u64) {
        self.inner.lock().irq.dispatch(line, now_fn);
    }

    pub fn irq_is_masked(&self, line: u16) -> bool {
        self.inner.lock().irq.is_masked(line)
    }

    pub fn irq_unhandled_hits(&self, line: u16) -> u32 {
        self.inner.lock().irq.unhandled_hits(line)
    }
}
