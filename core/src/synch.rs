//! The synchronization core: a wait object carrying ownership, priority
//! inheritance, priority-protect, and a fast userland lock word.
//!
//! Grounded on the teacher's `futex.rs` (hash-bucketed owner-tracked
//! wait, fastlock-style handle packing) and `waitqueue.rs` (ownerless
//! FIFO/priority wait, `wake_one`/`wake_all`/`remove_task`), with the
//! exact acquire/release/boost algorithm taken from
//! `original_source/kernel/cobalt/synch.c`.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use cadence_abi::errno::{CoreResult, Errno};
use cadence_abi::fastlock;
use cadence_abi::sched::Priority;
use cadence_abi::synch::{BlockReason, ObjectId, SynchFlags, ThreadId, ThreadMode, WakeInfo};
use cadence_abi::timer::Tick;

/// Upward-facing interface from the core to thread management. An
/// implementation owns the actual blocking primitive (a condvar in the
/// host test build); `suspend`/`wake` together form the synchronous
/// suspension model described in the design notes.
pub trait Scheduler: Send + Sync {
    fn current_thread(&self) -> ThreadId;
    fn base_priority_of(&self, thread: ThreadId) -> Priority;
    fn mode_of(&self, thread: ThreadId) -> ThreadMode;
    fn set_effective_priority(&self, thread: ThreadId, priority: Priority);
    /// Block the calling thread until `wake` targets it or `timeout_ticks`
    /// elapses. Returns the `WakeInfo` describing why it returned; an
    /// empty `WakeInfo` means a normal hand-off (`Ok`).
    fn suspend(&self, thread: ThreadId, reason: BlockReason, timeout_ticks: Option<Tick>) -> WakeInfo;
    /// Ready a suspended thread, recording why it was woken.
    fn wake(&self, thread: ThreadId, info: WakeInfo);
}

struct WaitObjectState {
    flags: SynchFlags,
    pendq: Vec<ThreadId>,
    owner: Option<ThreadId>,
    fastlock: u32,
    ceiling: Priority,
    /// Set by `release` when ownership is optimistically handed to a
    /// waiter that has not yet run past its suspend point. Cleared once
    /// that thread confirms via `finish_acquire`, or stolen out from
    /// under it by a higher-priority arrival (§4.3.3).
    pending_handoff: Option<ThreadId>,
    /// The thread (if any) a steal most recently displaced; consumed by
    /// that thread's next `finish_acquire` call.
    robbed: Option<ThreadId>,
}

impl WaitObjectState {
    fn new(flags: SynchFlags, ceiling: Priority) -> Self {
        Self {
            flags,
            pendq: Vec::new(),
            owner: None,
            fastlock: fastlock::NO_HANDLE,
            ceiling,
            pending_handoff: None,
            robbed: None,
        }
    }

    fn boosts_owner(&self) -> bool {
        self.ceiling > 0 || self.flags.contains(SynchFlags::PI_ENABLED)
    }
}

/// What `begin_acquire` found: either the fast path succeeded, or the
/// caller must drop the nucleus lock and call `Scheduler::suspend`.
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    MustWait,
}

fn insert_waiter(pendq: &mut Vec<ThreadId>, thread: ThreadId, priority: Priority, prio_order: bool, priority_of: impl Fn(ThreadId) -> Priority) {
    if !prio_order {
        pendq.push(thread);
        return;
    }
    cadence_lib::sorted_list::insert_by_rank_desc(pendq, thread, priority, |&t| priority_of(t));
}

/// Owns every wait object for one `Nucleus`, serialized externally by
/// the nucleus lock (see `crate::nucleus::Nucleus`).
pub struct SynchCore {
    objects: BTreeMap<ObjectId, WaitObjectState>,
    /// Objects each thread currently owns that may be boosting it.
    claims: BTreeMap<ThreadId, Vec<ObjectId>>,
    next_id: u32,
}

impl SynchCore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            claims: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn create(&mut self, flags: SynchFlags, ceiling: Priority) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.objects.insert(id, WaitObjectState::new(flags, ceiling));
        id
    }

    fn recompute_boost(&mut self, thread: ThreadId, sched: &dyn Scheduler) {
        let mut max_p = sched.base_priority_of(thread);
        if let Some(objs) = self.claims.get(&thread) {
            for &oid in objs {
                if let Some(obj) = self.objects.get(&oid) {
                    if obj.ceiling > max_p {
                        max_p = obj.ceiling;
                    }
                    if obj.flags.contains(SynchFlags::PI_ENABLED) {
                        if let Some(&first) = obj.pendq.first() {
                            let p = sched.base_priority_of(first);
                            if p > max_p {
                                max_p = p;
                            }
                        }
                    }
                }
            }
        }
        sched.set_effective_priority(thread, max_p);
    }

    fn add_claim(&mut self, thread: ThreadId, id: ObjectId) {
        self.claims.entry(thread).or_default().push(id);
    }

    fn drop_claim(&mut self, thread: ThreadId, id: ObjectId) {
        if let Some(list) = self.claims.get_mut(&thread) {
            list.retain(|&o| o != id);
        }
    }

    // ---- owner-tracked acquire / release -----------------------------

    pub fn begin_acquire(
        &mut self,
        id: ObjectId,
        sched: &dyn Scheduler,
    ) -> CoreResult<AcquireOutcome> {
        let self_thread = sched.current_thread();
        let priority = sched.base_priority_of(self_thread);
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if !obj.flags.contains(SynchFlags::OWNER_TRACKED) {
            return Err(Errno::InvalidHandle);
        }

        if obj.owner.is_none() {
            obj.owner = Some(self_thread);
            obj.fastlock = fastlock::pack(self_thread.0 + 1, false);
            let boosts = obj.boosts_owner();
            if boosts {
                self.add_claim(self_thread, id);
                self.recompute_boost(self_thread, sched);
            }
            cadence_lib::klog_debug!("cadence: object {:?} acquired uncontended by thread {:?}", id, self_thread);
            return Ok(AcquireOutcome::Acquired);
        }

        if sched.mode_of(self_thread) == ThreadMode::Relaxed && obj.boosts_owner() {
            cadence_lib::klog_warn!("cadence: thread {:?} (relaxed) refused ownership of PI/PP object {:?}", self_thread, id);
            return Err(Errno::ModeMismatch);
        }

        let owner = obj.owner.unwrap();
        let prio_order = obj.flags.contains(SynchFlags::PRIO_ORDER)
            && !obj.flags.contains(SynchFlags::DISABLE_REORDER);

        // Ownership-stealing race (§4.3.3, ground truth
        // `original_source/kernel/cobalt/synch.c`'s `XNWAKEN`/`XNROBBED`
        // handling): `owner` may be a thread `release` just handed this
        // object to, optimistically, before that thread has run past its
        // suspend point. A strictly higher-priority arrival steals the
        // object outright rather than queuing behind an unconfirmed
        // handoff.
        if prio_order && obj.pending_handoff == Some(owner) && priority > sched.base_priority_of(owner) {
            let boosts = obj.boosts_owner();
            let still_claimed = !obj.pendq.is_empty();
            obj.owner = Some(self_thread);
            obj.fastlock = fastlock::pack(self_thread.0 + 1, still_claimed);
            obj.pending_handoff = None;
            obj.robbed = Some(owner);
            if boosts {
                self.drop_claim(owner, id);
                self.add_claim(self_thread, id);
                self.recompute_boost(self_thread, sched);
            }
            self.recompute_boost(owner, sched);
            cadence_lib::klog_warn!("cadence: object {:?} stolen from thread {:?} by thread {:?}", id, owner, self_thread);
            return Ok(AcquireOutcome::Acquired);
        }

        insert_waiter(&mut obj.pendq, self_thread, priority, prio_order, |t| {
            sched.base_priority_of(t)
        });
        obj.flags.insert(SynchFlags::CLAIMED);
        obj.fastlock = fastlock::pack(fastlock::handle_of(obj.fastlock), true);
        let pi_enabled = obj.flags.contains(SynchFlags::PI_ENABLED);
        if pi_enabled {
            self.recompute_boost(owner, sched);
        }
        Ok(AcquireOutcome::MustWait)
    }

    pub fn finish_acquire(
        &mut self,
        id: ObjectId,
        thread: ThreadId,
        info: WakeInfo,
    ) -> CoreResult<()> {
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if let Some(pos) = obj.pendq.iter().position(|&t| t == thread) {
            obj.pendq.remove(pos);
            if obj.pendq.is_empty() {
                obj.flags.remove(SynchFlags::CLAIMED);
            }
        }
        let was_robbed = obj.robbed == Some(thread);
        if was_robbed {
            obj.robbed = None;
            cadence_lib::klog_warn!("cadence: thread {:?} discovers it was robbed of object {:?}", thread, id);
            return Err(Errno::Stolen);
        }
        if info.contains(WakeInfo::RMID) || info.contains(WakeInfo::BREAK) {
            return Err(Errno::Broken);
        }
        if info.contains(WakeInfo::TIMEO) {
            return Err(Errno::Timeout);
        }
        Ok(())
    }

    pub fn release(&mut self, id: ObjectId, sched: &dyn Scheduler) -> CoreResult<()> {
        let self_thread = sched.current_thread();
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if obj.owner != Some(self_thread) {
            return Err(Errno::InvalidHandle);
        }

        if obj.pendq.is_empty() {
            obj.owner = None;
            obj.fastlock = fastlock::NO_HANDLE;
        } else {
            let next = obj.pendq.remove(0);
            let still_claimed = !obj.pendq.is_empty();
            obj.owner = Some(next);
            obj.fastlock = fastlock::pack(next.0 + 1, still_claimed);
            obj.pending_handoff = Some(next);
            if !still_claimed {
                obj.flags.remove(SynchFlags::CLAIMED);
            }
            let boosts = obj.boosts_owner();
            if boosts {
                self.add_claim(next, id);
            }
            sched.wake(next, WakeInfo::empty());
        }

        self.drop_claim(self_thread, id);
        self.recompute_boost(self_thread, sched);
        cadence_lib::klog_debug!("cadence: object {:?} released by thread {:?}", id, self_thread);
        Ok(())
    }

    /// Re-sort `thread`'s position in `id`'s pendq after an external
    /// priority change, and re-evaluate the owner's boost if needed.
    pub fn requeue(&mut self, id: ObjectId, thread: ThreadId, sched: &dyn Scheduler) -> CoreResult<()> {
        let owner = {
            let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
            if !obj.flags.contains(SynchFlags::PRIO_ORDER)
                || obj.flags.contains(SynchFlags::DISABLE_REORDER)
            {
                return Ok(());
            }
            if let Some(pos) = obj.pendq.iter().position(|&t| t == thread) {
                obj.pendq.remove(pos);
            } else {
                return Ok(());
            }
            let priority = sched.base_priority_of(thread);
            insert_waiter(&mut obj.pendq, thread, priority, true, |t| sched.base_priority_of(t));
            obj.owner.filter(|_| obj.flags.contains(SynchFlags::PI_ENABLED))
        };
        if let Some(owner) = owner {
            self.recompute_boost(owner, sched);
        }
        Ok(())
    }

    // ---- ownerless wait -----------------------------------------------

    pub fn begin_sleep(&mut self, id: ObjectId, sched: &dyn Scheduler) -> CoreResult<()> {
        let self_thread = sched.current_thread();
        let priority = sched.base_priority_of(self_thread);
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        let prio_order = obj.flags.contains(SynchFlags::PRIO_ORDER);
        insert_waiter(&mut obj.pendq, self_thread, priority, prio_order, |t| {
            sched.base_priority_of(t)
        });
        Ok(())
    }

    pub fn finish_sleep(&mut self, id: ObjectId, thread: ThreadId) {
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.pendq.retain(|&t| t != thread);
        }
    }

    pub fn wakeup_one(&mut self, id: ObjectId, sched: &dyn Scheduler) -> CoreResult<()> {
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if !obj.pendq.is_empty() {
            let t = obj.pendq.remove(0);
            sched.wake(t, WakeInfo::empty());
        }
        Ok(())
    }

    pub fn wakeup_many(&mut self, id: ObjectId, sched: &dyn Scheduler) -> CoreResult<()> {
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        for t in obj.pendq.drain(..) {
            sched.wake(t, WakeInfo::empty());
        }
        Ok(())
    }

    pub fn has_waiters(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| !o.pendq.is_empty())
    }

    pub fn flush(&mut self, id: ObjectId, info: WakeInfo, sched: &dyn Scheduler) -> CoreResult<()> {
        let obj = self.objects.get_mut(&id).ok_or(Errno::InvalidHandle)?;
        if !obj.pendq.is_empty() {
            cadence_lib::klog_warn!("cadence: object {:?} flushed, breaking {} waiter(s)", id, obj.pendq.len());
        }
        for t in obj.pendq.drain(..) {
            sched.wake(t, info);
        }
        let owner = obj.owner.take();
        obj.fastlock = fastlock::NO_HANDLE;
        obj.flags.remove(SynchFlags::CLAIMED);
        if let Some(owner) = owner {
            self.drop_claim(owner, id);
        }
        Ok(())
    }

    pub fn destroy(&mut self, id: ObjectId, sched: &dyn Scheduler) -> CoreResult<()> {
        self.flush(id, WakeInfo::RMID, sched)?;
        self.objects.remove(&id);
        Ok(())
    }

    /// Remove `thread` from any pendq it is queued in, without touching
    /// ownership it independently holds. Called by the scheduler when a
    /// thread is deleted or forced out of `PEND` while queued.
    ///
    /// If the removed waiter was a `PI_ENABLED` object's current boost
    /// source (e.g. it was first in line), the owner's effective
    /// priority is stale until recomputed here (§3: "if `BOOSTED`, the
    /// owner's effective priority equals the max of ... priorities of
    /// first waiters on held `PI_ENABLED` objects").
    pub fn forget(&mut self, thread: ThreadId, sched: &dyn Scheduler) {
        let mut affected_owners = Vec::new();
        for obj in self.objects.values_mut() {
            if let Some(pos) = obj.pendq.iter().position(|&t| t == thread) {
                obj.pendq.remove(pos);
                if obj.pendq.is_empty() {
                    obj.flags.remove(SynchFlags::CLAIMED);
                }
                if obj.flags.contains(SynchFlags::PI_ENABLED) {
                    if let Some(owner) = obj.owner {
                        affected_owners.push(owner);
                    }
                }
            }
        }
        for owner in affected_owners {
            self.recompute_boost(owner, sched);
        }
    }

    pub fn owner_of(&self, id: ObjectId) -> Option<ThreadId> {
        self.objects.get(&id).and_then(|o| o.owner)
    }

    pub fn fastlock_of(&self, id: ObjectId) -> Option<u32> {
        self.objects.get(&id).map(|o| o.fastlock)
    }

    pub fn pendq_len(&self, id: ObjectId) -> usize {
        self.objects.get(&id).map_or(0, |o| o.pendq.len())
    }
}

impl Default for SynchCore {
    fn default() -> Self {
        Self::new()
    }
}
