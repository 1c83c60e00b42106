//! IRQ dispatcher: the low-level handler runner, sharing, accounting,
//! and chaining component (§4.5). Grounded on the teacher's `irq.rs`
//! (`IrqEntry`/`IrqRouteState`, the report-once-per-line unhandled-hit
//! pattern, a revision counter guarding detach) generalized from a
//! fixed global table to a per-`Nucleus` instance.

use alloc::boxed::Box;
use alloc::vec::Vec;

use cadence_abi::errno::{CoreResult, Errno};
use cadence_abi::irq::{AttachToken, IrqMode, IrqOutcome};

use crate::config::{EDGE_SHARED_MAX_PASSES, UNHANDLED_AUTO_DISABLE_THRESHOLD};

pub type IrqHandlerFn = Box<dyn FnMut() -> IrqOutcome + Send>;

struct HandlerEntry {
    token: u32,
    handler: IrqHandlerFn,
    exec_ticks: u64,
}

struct Line {
    mode: Option<IrqMode>,
    handlers: Vec<HandlerEntry>,
    revision: u32,
    next_token: u32,
    unhandled_hits: u32,
    masked: bool,
}

impl Line {
    const fn new() -> Self {
        Self {
            mode: None,
            handlers: Vec::new(),
            revision: 0,
            next_token: 0,
            unhandled_hits: 0,
            masked: false,
        }
    }
}

pub struct IrqDispatcher {
    lines: Vec<Line>,
    /// Line whose handler chain always runs first, regardless of
    /// attach order (§4.5.3: the clock source's tick handler).
    clock_line: Option<u16>,
    /// Guards `set_clock_line` to a single call per dispatcher, mirroring
    /// the teacher's `IRQ_SYSTEM_INIT` one-shot setup gate.
    clock_line_init: cadence_lib::InitFlag,
}

impl IrqDispatcher {
    pub fn new(num_lines: usize) -> Self {
        let mut lines = Vec::with_capacity(num_lines);
        lines.resize_with(num_lines, Line::new);
        Self {
            lines,
            clock_line: None,
            clock_line_init: cadence_lib::InitFlag::new(),
        }
    }

    /// Designate the line whose handler chain runs first. Only the
    /// first call takes effect; later calls are rejected so the clock
    /// line can't be silently reassigned once handlers depend on it.
    pub fn set_clock_line(&mut self, line: u16) {
        if self.clock_line_init.mark() {
            self.clock_line = Some(line);
        } else {
            cadence_lib::klog_warn!("cadence: ignoring repeat set_clock_line({}), already pinned to {:?}", line, self.clock_line);
        }
    }

    fn line_mut(&mut self, line: u16) -> CoreResult<&mut Line> {
        self.lines.get_mut(line as usize).ok_or(Errno::InvalidHandle)
    }

    pub fn attach(&mut self, line: u16, mode: IrqMode, handler: IrqHandlerFn) -> CoreResult<(AttachToken, u32)> {
        let is_clock_line = self.clock_line == Some(line);
        let l = self.line_mut(line)?;

        match l.mode {
            Some(IrqMode::Exclusive) => return Err(Errno::AlreadyAttached),
            Some(existing) if mode == IrqMode::Exclusive => {
                let _ = existing;
                return Err(Errno::AlreadyAttached);
            }
            Some(existing) if existing != mode => return Err(Errno::AlreadyAttached),
            _ => {}
        }

        l.mode = Some(mode);
        l.revision = l.revision.wrapping_add(1);
        let token = l.next_token;
        l.next_token += 1;
        let entry = HandlerEntry {
            token,
            handler,
            exec_ticks: 0,
        };
        if is_clock_line {
            l.handlers.insert(0, entry);
        } else {
            l.handlers.push(entry);
        }
        Ok((
            AttachToken {
                line,
                revision: l.revision,
            },
            token,
        ))
    }

    pub fn detach(&mut self, tok: AttachToken, handler_token: u32) -> CoreResult<()> {
        let l = self.line_mut(tok.line)?;
        if l.revision != tok.revision {
            return Err(Errno::NotAttached);
        }
        let pos = l
            .handlers
            .iter()
            .position(|h| h.token == handler_token)
            .ok_or(Errno::NotAttached)?;
        l.handlers.remove(pos);
        if l.handlers.is_empty() {
            l.mode = None;
        }
        Ok(())
    }

    pub fn is_masked(&self, line: u16) -> bool {
        self.lines.get(line as usize).is_some_and(|l| l.masked)
    }

    pub fn unhandled_hits(&self, line: u16) -> u32 {
        self.lines.get(line as usize).map_or(0, |l| l.unhandled_hits)
    }

    pub fn exec_ticks(&self, line: u16, token: u32) -> Option<u64> {
        self.lines
            .get(line as usize)?
            .handlers
            .iter()
            .find(|h| h.token == token)
            .map(|h| h.exec_ticks)
    }

    /// Run the handler chain for `line`. `now_fn` is sampled before and
    /// after each handler invocation to attribute execution time.
    pub fn dispatch(&mut self, line: u16, mut now_fn: impl FnMut() -> u64) {
        let l = match self.lines.get_mut(line as usize) {
            Some(l) => l,
            None => return,
        };
        if l.masked {
            return;
        }
        if l.handlers.is_empty() {
            Self::account_unhandled(line, l, false);
            return;
        }

        let any_handled = match l.mode {
            Some(IrqMode::Exclusive) | None => {
                if let Some(h) = l.handlers.first_mut() {
                    let start = now_fn();
                    let outcome = (h.handler)();
                    h.exec_ticks += now_fn().saturating_sub(start);
                    outcome == IrqOutcome::Handled
                } else {
                    false
                }
            }
            Some(IrqMode::LevelShared) => {
                let mut any = false;
                for h in l.handlers.iter_mut() {
                    let start = now_fn();
                    let outcome = (h.handler)();
                    h.exec_ticks += now_fn().saturating_sub(start);
                    if outcome == IrqOutcome::Handled {
                        any = true;
                    }
                }
                any
            }
            Some(IrqMode::EdgeShared) => {
                let mut pass = 0u32;
                let mut any = false;
                loop {
                    let mut pass_handled = false;
                    for h in l.handlers.iter_mut() {
                        let start = now_fn();
                        let outcome = (h.handler)();
                        h.exec_ticks += now_fn().saturating_sub(start);
                        if outcome == IrqOutcome::Handled {
                            pass_handled = true;
                        }
                    }
                    if pass_handled {
                        any = true;
                    }
                    pass += 1;
                    cadence_lib::klog_trace!("cadence: irq line {} edge-shared pass {} handled={}", line, pass, pass_handled);
                    if !pass_handled || pass >= EDGE_SHARED_MAX_PASSES {
                        break;
                    }
                }
                any
            }
        };

        Self::account_unhandled(line, l, any_handled);
    }

    /// Track consecutive dispatch calls where no handler in the chain
    /// reported `Handled`, resetting on any success; auto-mask the line
    /// once the streak crosses the threshold (§4.5.2).
    fn account_unhandled(line: u16, l: &mut Line, handled: bool) {
        if handled {
            l.unhandled_hits = 0;
            return;
        }
        l.unhandled_hits = l.unhandled_hits.saturating_add(1);
        if l.unhandled_hits == UNHANDLED_AUTO_DISABLE_THRESHOLD {
            l.masked = true;
            cadence_lib::klog_warn!(
                "cadence: irq line {} auto-disabled after {} unhandled hits",
                line,
                UNHANDLED_AUTO_DISABLE_THRESHOLD
            );
        }
    }
}
