//! Error taxonomy shared across the core.
//!
//! Mirrors the shape of a C kernel's negative-errno return convention
//! (see [`Errno::to_raw`]/[`Errno::from_raw`]) while giving Rust callers
//! a typed enum to match on.

/// Negative-errno encoding, Linux-compatible where a direct analogue exists.
pub const RAW_EINVAL: i64 = -22;
pub const RAW_ENOMEM: i64 = -12;
pub const RAW_EAGAIN: i64 = -11;
pub const RAW_ESRCH: i64 = -3;
pub const RAW_EFAULT: i64 = -14;
pub const RAW_ETIMEDOUT: i64 = -110;
pub const RAW_EBUSY: i64 = -16;
pub const RAW_ENXIO: i64 = -6;

/// Outcome of a core operation that can fail.
///
/// All-or-nothing: an `Err` return guarantees no partial state mutation
/// was observed by the caller (see the component design notes for the
/// exact guarantees per operation).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Errno {
    /// The wait timed out before being satisfied.
    Timeout,
    /// Another thread claimed ownership ahead of the caller.
    Stolen,
    /// The wait was broken by a flush, destroy, or forced wakeup.
    Broken,
    /// A relaxed (host-scheduled) thread attempted to own a PI/PP object.
    ModeMismatch,
    /// The supplied handle does not refer to a live object.
    InvalidHandle,
    /// A non-blocking call could not complete immediately.
    WouldBlock,
    /// The resource is already in use (e.g. exclusive IRQ line taken).
    Busy,
    /// A fixed-capacity structure is full.
    NoMemory,
    /// An IRQ line already has a handler registered under the same mode.
    AlreadyAttached,
    /// Detach was attempted with a stale revision or on an unattached line.
    NotAttached,
    /// The IRQ line is currently masked at the controller.
    LineMasked,
}

impl Errno {
    pub const fn to_raw(self) -> i64 {
        match self {
            Errno::Timeout => RAW_ETIMEDOUT,
            Errno::Stolen => RAW_EAGAIN,
            Errno::Broken => RAW_EINVAL,
            Errno::ModeMismatch => RAW_EINVAL,
            Errno::InvalidHandle => RAW_ESRCH,
            Errno::WouldBlock => RAW_EAGAIN,
            Errno::Busy => RAW_EBUSY,
            Errno::NoMemory => RAW_ENOMEM,
            Errno::AlreadyAttached => RAW_EBUSY,
            Errno::NotAttached => RAW_ENXIO,
            Errno::LineMasked => RAW_ENXIO,
        }
    }
}

pub type CoreResult<T> = Result<T, Errno>;
