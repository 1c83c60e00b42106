//! Counting semaphores, layered over the ownerless side of the
//! synchronization core (§4.4). Mutex-flavor semaphores are not
//! modeled here — an `OWNER_TRACKED` wait object (`synch::SynchCore`)
//! is used directly for those, since representing a mutex as a
//! binary semaphore loses ownership information the core needs for
//! priority inheritance.

use alloc::collections::BTreeMap;

use cadence_abi::errno::{CoreResult, Errno};
use cadence_abi::synch::{ObjectId, SynchFlags, WakeInfo};

use crate::synch::SynchCore;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SemFlags: u8 {
        /// FIFO wake order (default if neither is set).
        const FIFO  = 1 << 0;
        /// Priority wake order.
        const PRIO  = 1 << 1;
        /// Signals with no waiter are dropped instead of accumulating.
        const PULSE = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemId(pub u32);

struct SemState {
    object: ObjectId,
    count: i64,
    cap: Option<i64>,
    pulse: bool,
}

pub struct SemTable {
    sems: BTreeMap<SemId, SemState>,
    next_id: u32,
}

impl SemTable {
    pub fn new() -> Self {
        Self {
            sems: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn create(&mut self, synch: &mut SynchCore, flags: SemFlags, initial: i64, cap: Option<i64>) -> SemId {
        let pulse = flags.contains(SemFlags::PULSE);
        debug_assert!(!(pulse && initial != 0), "PULSE semaphore must be created with count 0 (§4.4)");
        let initial = if pulse { 0 } else { initial };

        let mut synch_flags = SynchFlags::empty();
        if flags.contains(SemFlags::PRIO) {
            synch_flags |= SynchFlags::PRIO_ORDER;
        }
        let object = synch.create(synch_flags, 0);
        let id = SemId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        cadence_lib::klog_debug!(
            "cadence: semaphore {:?} created (initial={} cap={:?} pulse={})",
            id,
            initial,
            cap,
            pulse
        );
        self.sems.insert(
            id,
            SemState {
                object,
                count: initial,
                cap,
                pulse,
            },
        );
        id
    }

    fn state(&self, id: SemId) -> CoreResult<&SemState> {
        self.sems.get(&id).ok_or(Errno::InvalidHandle)
    }

    pub fn try_take(&mut self, id: SemId) -> CoreResult<bool> {
        let state = self.sems.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if state.count > 0 {
            state.count -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Call before suspending: returns `Some(object)` if the caller
    /// must block on the underlying wait object.
    pub fn begin_wait(&mut self, id: SemId) -> CoreResult<Option<ObjectId>> {
        if self.try_take(id)? {
            Ok(None)
        } else {
            Ok(Some(self.state(id)?.object))
        }
    }

    pub fn finish_wait(info: WakeInfo) -> CoreResult<()> {
        if info.contains(WakeInfo::RMID) || info.contains(WakeInfo::BREAK) {
            return Err(Errno::Broken);
        }
        if info.contains(WakeInfo::TIMEO) {
            return Err(Errno::Timeout);
        }
        Ok(())
    }

    pub fn signal(&mut self, id: SemId, synch: &mut SynchCore, sched: &dyn crate::synch::Scheduler) -> CoreResult<()> {
        let state = self.sems.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if synch.has_waiters(state.object) {
            synch.wakeup_one(state.object, sched)?;
        } else if !state.pulse {
            state.count = match state.cap {
                Some(cap) => (state.count + 1).min(cap),
                None => state.count + 1,
            };
        }
        Ok(())
    }

    pub fn broadcast(&mut self, id: SemId, synch: &mut SynchCore, sched: &dyn crate::synch::Scheduler) -> CoreResult<()> {
        let state = self.state(id)?;
        synch.wakeup_many(state.object, sched)
    }

    pub fn destroy(&mut self, id: SemId, synch: &mut SynchCore, sched: &dyn crate::synch::Scheduler) -> CoreResult<()> {
        let state = self.sems.remove(&id).ok_or(Errno::InvalidHandle)?;
        synch.destroy(state.object, sched)
    }

    pub fn count(&self, id: SemId) -> CoreResult<i64> {
        Ok(self.state(id)?.count)
    }
}

impl Default for SemTable {
    fn default() -> Self {
        Self::new()
    }
}
