//! Cadence kernel-core ABI types.
//!
//! This crate provides the canonical definitions shared between the
//! executive core (`cadence-core`), its ambient infrastructure
//! (`cadence-lib`), and any external scheduler/clock driver that embeds
//! the core. Having a single source of truth eliminates duplicate type
//! definitions and ABI mismatches across that boundary.
//!
//! The crate is `no_std` + `forbid(unsafe_code)`: nothing in here
//! touches hardware directly, it only defines the vocabulary both
//! sides of the boundary agree on.

#![no_std]
#![forbid(unsafe_code)]

pub mod errno;
pub mod fastlock;
pub mod irq;
pub mod sched;
pub mod synch;
pub mod timer;

pub use errno::*;
pub use fastlock::*;
pub use irq::*;
pub use sched::*;
pub use synch::*;
pub use timer::*;
