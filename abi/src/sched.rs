//! Generic scheduling-facing constants shared with the `Scheduler`
//! capability record. The core does not implement a scheduler; these
//! exist so callers and the core agree on units (priority scale,
//! max CPU count) without the core reaching into scheduler internals.

/// Upper bound on the number of CPUs a single `Nucleus` manages.
pub const MAX_CPUS: usize = 32;

/// Priority is an opaque ascending scale; 0 is lowest.
pub type Priority = u32;

pub const PRIORITY_IDLE: Priority = 0;
pub const PRIORITY_MAX: Priority = u32::MAX;
