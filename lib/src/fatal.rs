//! Fatal-hook registry.
//!
//! Hardware faults and internal invariant breaches detected outside a
//! debug assertion are routed here instead of being propagated as an
//! ordinary `Err`. The registered hook must not return; what it does
//! (halt, reset, abort the host process) is entirely up to whoever
//! embeds the core. Generalized from the platform's panic-recovery
//! cleanup registry, minus the architecture-specific longjmp: this
//! crate never tries to resume execution past a fatal condition.

use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

pub type FatalHook = fn(&str) -> !;

const MAX_CLEANUP_HANDLERS: usize = 8;

fn default_hook(reason: &str) -> ! {
    panic!("cadence: fatal condition with no hook registered: {reason}");
}

static HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

static CLEANUP_COUNT: AtomicUsize = AtomicUsize::new(0);
static CLEANUP_HANDLERS: [AtomicPtr<()>; MAX_CLEANUP_HANDLERS] = [
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
    AtomicPtr::new(core::ptr::null_mut()),
];

/// Register the hook invoked by [`fatal`]. Last registration wins.
pub fn register_fatal_hook(hook: FatalHook) {
    HOOK.store(hook as *mut (), Ordering::Release);
}

/// Register a cleanup callback run (in registration order) just before
/// the fatal hook is invoked. Up to `MAX_CLEANUP_HANDLERS` may be
/// registered; further registrations are silently dropped.
pub fn register_fatal_cleanup(handler: fn()) {
    let idx = CLEANUP_COUNT.fetch_add(1, Ordering::SeqCst);
    if idx < MAX_CLEANUP_HANDLERS {
        CLEANUP_HANDLERS[idx].store(handler as *mut (), Ordering::SeqCst);
    }
}

/// Run every registered cleanup handler, then invoke the fatal hook.
/// Never returns.
pub fn fatal(reason: &str) -> ! {
    let count = CLEANUP_COUNT.load(Ordering::SeqCst).min(MAX_CLEANUP_HANDLERS);
    for slot in CLEANUP_HANDLERS.iter().take(count) {
        let handler = slot.load(Ordering::SeqCst);
        if !handler.is_null() {
            let func: fn() = unsafe { core::mem::transmute(handler) };
            func();
        }
    }

    let ptr = HOOK.load(Ordering::Acquire);
    if ptr.is_null() {
        default_hook(reason)
    } else {
        // SAFETY: only `register_fatal_hook` stores into `HOOK`, and it
        // only ever stores a valid `FatalHook` fn pointer.
        let hook: FatalHook = unsafe { core::mem::transmute(ptr) };
        hook(reason)
    }
}
