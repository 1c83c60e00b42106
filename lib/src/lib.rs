//! Ambient infrastructure for the executive core: locking, logging, and
//! the fatal-condition hook. Nothing in this crate knows about timers,
//! wait objects, or interrupts — see `cadence-core` for that.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod fatal;
pub mod init_flag;
pub mod klog;
pub mod nklock;
pub mod sorted_list;

pub use fatal::{fatal, register_fatal_cleanup, register_fatal_hook};
pub use init_flag::InitFlag;
pub use klog::{KlogLevel, klog_get_level, klog_is_enabled, klog_register_backend, klog_set_level};
pub use nklock::{NkLock, NkLockGuard};
