//! `cadence-core`: the dual-kernel real-time executive — a timer wheel,
//! wait objects with priority inheritance/protect, counting semaphores,
//! and an IRQ dispatcher, all serialized behind one [`nucleus::Nucleus`].
//!
//! Hardware and thread management are never touched directly; the core
//! only calls through the [`clock::ClockDriver`] and [`synch::Scheduler`]
//! capability records supplied at construction.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod irq;
pub mod nucleus;
pub mod sem;
pub mod synch;
pub mod timer;

pub use clock::{ClockDriver, ClockSource};
pub use irq::IrqDispatcher;
pub use nucleus::Nucleus;
pub use sem::{SemFlags, SemId, SemTable};
pub use synch::{AcquireOutcome, Scheduler, SynchCore};
pub use timer::{TimerHandler, TimerRecord, TimerWheelSet};
