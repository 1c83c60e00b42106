//! Per-CPU timer wheel.
//!
//! Grounded on the teacher's data-driven net timer wheel and APIC
//! calibration modules in spirit (fixed-capacity lines, opaque handle
//! tokens, a bounded per-tick work budget), but backed by an ordered
//! map instead of a fixed slot array: the spec requires true
//! absolute-tick ordering, arbitrary pre-fire removal, and cross-CPU
//! migration, none of which a fixed-slot wheel expresses cleanly (see
//! DESIGN.md Open Question 1).

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use cadence_abi::errno::{CoreResult, Errno};
use cadence_abi::timer::{Tick, TimerFlags, TimerId};

use crate::clock::ClockDriver;

pub type TimerHandler = Box<dyn FnMut(TimerId, &mut TimerRecord) + Send>;

#[derive(Clone, Copy)]
pub struct TimerRecord {
    pub expiry: Tick,
    pub interval: Tick,
    pub pexpect: Tick,
    pub flags: TimerFlags,
    pub owner_cpu: usize,
    pub overruns: u64,
}

struct Slot {
    record: TimerRecord,
    handler: TimerHandler,
    seq: u64,
}

#[derive(Default)]
struct PerCpuWheel {
    order: BTreeMap<(Tick, u64), TimerId>,
    slots: BTreeMap<TimerId, Slot>,
    next_seq: u64,
    /// Ticks whose only due timer was a `HOST_TICK` placeholder and so
    /// were not dispatched to the real-time handler chain (§4.2.2).
    deferred_ticks: u64,
}

impl PerCpuWheel {
    fn head_key(&self) -> Option<(Tick, u64)> {
        self.order.keys().next().copied()
    }

    fn reprogram(&self, driver: &dyn ClockDriver) {
        match self.head_key() {
            Some((expiry, _)) => driver.program_shot(expiry),
            None => driver.disarm(),
        }
    }
}

/// The set of per-CPU wheels owned by one `Nucleus`.
pub struct TimerWheelSet {
    wheels: Vec<PerCpuWheel>,
    next_id: u32,
}

impl TimerWheelSet {
    pub fn new(num_cpus: usize) -> Self {
        let mut wheels = Vec::with_capacity(num_cpus);
        wheels.resize_with(num_cpus, PerCpuWheel::default);
        Self { wheels, next_id: 0 }
    }

    fn wheel_mut(&mut self, cpu: usize) -> CoreResult<&mut PerCpuWheel> {
        self.wheels.get_mut(cpu).ok_or(Errno::InvalidHandle)
    }

    pub fn start(
        &mut self,
        cpu: usize,
        expiry: Tick,
        interval: Tick,
        mut flags: TimerFlags,
        handler: TimerHandler,
        driver: &dyn ClockDriver,
    ) -> CoreResult<TimerId> {
        flags.remove(TimerFlags::DEQUEUED);
        flags.remove(TimerFlags::FIRED);
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let wheel = self.wheel_mut(cpu)?;
        let seq = wheel.next_seq;
        wheel.next_seq += 1;
        let record = TimerRecord {
            expiry,
            interval,
            pexpect: expiry,
            flags,
            owner_cpu: cpu,
            overruns: 0,
        };
        let was_head = wheel.head_key().is_none_or(|(e, _)| expiry < e);
        wheel.order.insert((expiry, seq), id);
        wheel.slots.insert(id, Slot { record, handler, seq });
        if was_head {
            driver.program_shot(expiry);
        }
        cadence_lib::klog_debug!(
            "cadence: timer {:?} started on cpu {} expiry={} interval={}",
            id,
            cpu,
            expiry,
            interval
        );
        Ok(id)
    }

    pub fn stop(&mut self, cpu: usize, id: TimerId, driver: &dyn ClockDriver) -> CoreResult<()> {
        let wheel = self.wheel_mut(cpu)?;
        let slot = wheel.slots.remove(&id).ok_or(Errno::InvalidHandle)?;
        let key = (slot.record.expiry, slot.seq);
        let was_head = wheel.head_key() == Some(key);
        wheel.order.remove(&key);
        if was_head {
            wheel.reprogram(driver);
        }
        cadence_lib::klog_debug!("cadence: timer {:?} stopped on cpu {}", id, cpu);
        Ok(())
    }

    /// Move a timer to another CPU's wheel. Must be called by logic
    /// running on `from_cpu` (the caller's responsibility — the core
    /// itself has no notion of "current CPU").
    pub fn migrate(
        &mut self,
        id: TimerId,
        from_cpu: usize,
        to_cpu: usize,
        driver: &dyn ClockDriver,
    ) -> CoreResult<()> {
        if from_cpu == to_cpu {
            return Ok(());
        }
        let mut slot = {
            let wheel = self.wheel_mut(from_cpu)?;
            let slot = wheel.slots.remove(&id).ok_or(Errno::InvalidHandle)?;
            let key = (slot.record.expiry, slot.seq);
            let was_head = wheel.head_key() == Some(key);
            wheel.order.remove(&key);
            if was_head {
                wheel.reprogram(driver);
            }
            slot
        };
        slot.record.owner_cpu = to_cpu;
        let dest = self.wheel_mut(to_cpu)?;
        let seq = dest.next_seq;
        dest.next_seq += 1;
        let expiry = slot.record.expiry;
        let was_head = dest.head_key().is_none_or(|(e, _)| expiry < e);
        slot.seq = seq;
        dest.order.insert((expiry, seq), id);
        dest.slots.insert(id, slot);
        if was_head {
            driver.program_shot(expiry);
        }
        Ok(())
    }

    /// Drain every timer due at or before `now` on `cpu`'s wheel,
    /// running each handler and reloading periodic timers. Reprograms
    /// the hardware shot for the new head (or disarms) when done.
    pub fn tick(&mut self, cpu: usize, now: Tick, driver: &dyn ClockDriver) {
        let wheel = match self.wheels.get_mut(cpu) {
            Some(w) => w,
            None => return,
        };
        loop {
            let (key, id) = match wheel.order.iter().next() {
                Some((&k, &v)) => (k, v),
                None => break,
            };
            if key.0 > now {
                break;
            }
            wheel.order.remove(&key);
            let mut slot = match wheel.slots.remove(&id) {
                Some(s) => s,
                None => {
                    cadence_lib::klog_error!("cadence: cpu {} timer wheel order/slots desync for {:?}", cpu, id);
                    cadence_lib::fatal(
                        "cadence: timer wheel order/slots desync: id present in order index but missing its slot",
                    )
                }
            };

            if slot.record.flags.contains(TimerFlags::HOST_TICK) {
                // The host device's own periodic tick shares this
                // hardware oneshot; it is never dispatched to the
                // real-time handler chain (§4.2.2) — only reloaded.
                wheel.deferred_ticks += 1;
                cadence_lib::klog_trace!("cadence: cpu {} host tick deferred (total {})", cpu, wheel.deferred_ticks);
                if slot.record.interval > 0 {
                    let overruns = (now - slot.record.pexpect) / slot.record.interval;
                    slot.record.pexpect += (overruns + 1) * slot.record.interval;
                    slot.record.expiry = slot.record.pexpect;
                    let seq = wheel.next_seq;
                    wheel.next_seq += 1;
                    slot.seq = seq;
                    wheel.order.insert((slot.record.expiry, seq), id);
                    wheel.slots.insert(id, slot);
                }
                continue;
            }

            slot.record.flags.insert(TimerFlags::FIRED);

            let periodic =
                slot.record.flags.contains(TimerFlags::PERIODIC) && slot.record.interval > 0;
            if periodic {
                let overruns = (now - slot.record.pexpect) / slot.record.interval;
                slot.record.overruns = overruns;
                slot.record.pexpect += (overruns + 1) * slot.record.interval;
                slot.record.expiry = slot.record.pexpect;
                slot.record.flags.remove(TimerFlags::FIRED);
            }

            cadence_lib::klog_trace!("cadence: cpu {} timer {:?} fired at tick {}", cpu, id, now);
            (slot.handler)(id, &mut slot.record);

            if periodic && !slot.record.flags.contains(TimerFlags::KILLED) {
                let seq = wheel.next_seq;
                wheel.next_seq += 1;
                slot.seq = seq;
                wheel.order.insert((slot.record.expiry, seq), id);
                wheel.slots.insert(id, slot);
            } else {
                // consumed: leave it out of both maps. `DEQUEUED` is
                // implicit for a timer no caller can look up anymore.
            }
        }
        wheel.reprogram(driver);
    }

    /// Ticks on `cpu` whose only due timer was a `HOST_TICK` placeholder
    /// and so were deferred instead of running the handler chain.
    pub fn deferred_ticks(&self, cpu: usize) -> u64 {
        self.wheels.get(cpu).map_or(0, |w| w.deferred_ticks)
    }

    /// Shift every `REALTIME` timer on every CPU by `delta` ticks and
    /// re-sort them, then reprogram each CPU's hardware shot.
    pub fn adjust_all(&mut self, delta: i64, driver: &dyn ClockDriver) {
        cadence_lib::klog_info!("cadence: realtime timers shifted by {} ticks", delta);
        for wheel in self.wheels.iter_mut() {
            let affected: Vec<TimerId> = wheel
                .slots
                .iter()
                .filter(|(_, s)| s.record.flags.contains(TimerFlags::REALTIME))
                .map(|(&id, _)| id)
                .collect();
            for id in affected {
                let mut slot = match wheel.slots.remove(&id) {
                    Some(s) => s,
                    None => continue,
                };
                wheel.order.remove(&(slot.record.expiry, slot.seq));
                let shifted = (slot.record.expiry as i64 + delta).max(0) as Tick;
                slot.record.expiry = shifted;
                let seq = wheel.next_seq;
                wheel.next_seq += 1;
                slot.seq = seq;
                wheel.order.insert((shifted, seq), id);
                wheel.slots.insert(id, slot);
            }
            wheel.reprogram(driver);
        }
    }

    pub fn record_of(&self, cpu: usize, id: TimerId) -> Option<TimerRecord> {
        self.wheels.get(cpu)?.slots.get(&id).map(|s| s.record)
    }

    pub fn head_expiry(&self, cpu: usize) -> Option<Tick> {
        self.wheels.get(cpu)?.head_key().map(|(e, _)| e)
    }
}
