//! IRQ dispatcher ABI types.

/// Outcome a handler reports after being invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqOutcome {
    Handled,
    NotHandled,
}

/// Sharing discipline requested at attach time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqMode {
    /// Only one handler may own the line.
    Exclusive,
    /// Level-triggered; every handler always runs a full pass.
    LevelShared,
    /// Edge-triggered; re-passes the chain while a handler reports `Handled`.
    EdgeShared,
}

/// Stable handle returned by `attach`, required to `detach`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachToken {
    pub line: u16,
    pub revision: u32,
}
