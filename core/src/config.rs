//! Compile-time tunables for the executive core, collected in one place
//! (the teacher scatters the equivalent constants across `irq.rs`,
//! `futex.rs`, and `waitqueue.rs`; here they live together since every
//! consumer is inside this one crate).

pub use cadence_abi::sched::MAX_CPUS;

/// Number of interrupt lines the dispatcher tracks.
pub const IRQ_LINES: usize = 16;

/// Consecutive unhandled hits on a line before it is auto-disabled.
pub const UNHANDLED_AUTO_DISABLE_THRESHOLD: u32 = 1000;

/// Upper bound on edge-shared dispatch passes per interrupt, guaranteeing
/// termination under a misbehaving handler that never stops re-asserting.
pub const EDGE_SHARED_MAX_PASSES: u32 = 128;
