//! Common types for breakpoint handling.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::context::TrapContext;
use crate::core::MemoryError;

/// Callback run when a breakpoint is hit
pub type Handler = Arc<dyn Fn(&TrapContext<'_>) + Send + Sync>;

/// Breakpoint errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakpointError {
    #[error("Breakpoint {address:#x} already has a handler: {existing}, ignoring new handler {rejected}")]
    Conflict {
        address: usize,
        existing: &'static str,
        rejected: &'static str,
    },

    #[error("Breakpoint state is in use (re-entrant access from a trap or callback)")]
    Busy,

    #[error("Failed to register SIGTRAP handler: {0}")]
    SignalSetup(String),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl BreakpointError {
    /// Whether the host cannot support breakpoints at all
    pub fn is_environment_failure(&self) -> bool {
        matches!(
            self,
            BreakpointError::SignalSetup(_) | BreakpointError::Memory(_)
        )
    }
}

/// A patched code location
#[derive(Clone)]
pub struct BreakpointRecord {
    /// Breakpoint address (identity key)
    pub address: usize,
    /// Callback invoked on hit
    pub handler: Handler,
    /// Type name of the callback, for diagnostics
    pub handler_name: &'static str,
    /// Positive for a primary breakpoint. Negative for a sibling, whose
    /// primary lives at `address + trap_size`.
    pub trap_size: isize,
    /// Original instruction bytes under the trap opcode
    pub saved_bytes: Vec<u8>,
}

impl BreakpointRecord {
    pub fn is_sibling(&self) -> bool {
        self.trap_size < 0
    }

    /// The other half of a primary/sibling pair
    pub fn partner_address(&self) -> usize {
        self.address.wrapping_add_signed(self.trap_size)
    }
}

impl fmt::Debug for BreakpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointRecord")
            .field("address", &format_args!("{:#x}", self.address))
            .field("handler", &self.handler_name)
            .field("trap_size", &self.trap_size)
            .field("saved_bytes", &hex::encode(&self.saved_bytes))
            .finish()
    }
}

/// Outcome of handling one SIGTRAP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapEvent {
    /// A primary breakpoint fired and its handler ran
    BreakpointHit { address: usize },

    /// The trap opcode at `address` was put back after the original
    /// instruction executed
    Rearmed { address: usize },

    /// No breakpoint is registered at `address`
    Undefined { address: usize },

    /// Patching failed while handling the trap at `address`
    Failed { address: usize, reason: String },
}

/// Trap counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapStats {
    pub hits: u64,
    pub rearms: u64,
    pub undefined: u64,
}
