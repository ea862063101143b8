//! Process-wide breakpoint state.
//!
//! Valid under single-threaded execution only: the pending re-arm slot
//! assumes no second thread passes through a breakpoint while another is
//! between its trap and the following re-arm trap.

use std::sync::Arc;

use super::context::TrapContext;
use super::table::BreakpointTable;
use super::types::{BreakpointError, BreakpointRecord, Handler, TrapStats};
use crate::arch::ArchSpec;
use crate::core::{CodeMemory, Patcher};

/// Breakpoint whose trap is waiting for the single-step trap to be re-armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRearm {
    pub address: usize,
}

/// Registry, pending re-arm slot and counters
pub struct TrapState {
    pub(super) arch: ArchSpec,
    pub(super) table: BreakpointTable,
    pub(super) pending: Option<PendingRearm>,
    pub(super) stats: TrapStats,
}

/// Callback of sibling records
fn nop(_ctx: &TrapContext<'_>) {}

impl TrapState {
    pub fn new(arch: ArchSpec) -> Self {
        Self {
            arch,
            table: BreakpointTable::new(),
            pending: None,
            stats: TrapStats::default(),
        }
    }

    pub fn arch(&self) -> &ArchSpec {
        &self.arch
    }

    pub fn table(&self) -> &BreakpointTable {
        &self.table
    }

    pub fn pending(&self) -> Option<PendingRearm> {
        self.pending
    }

    pub fn stats(&self) -> TrapStats {
        self.stats
    }

    /// Patch a trap at `address` and record `handler` for it.
    ///
    /// On sibling-trap architectures the following instruction slot is saved
    /// as well, so the trap can be re-armed after the original instruction
    /// runs. A conflict leaves code and table untouched.
    pub fn register<M: CodeMemory>(
        &mut self,
        memory: &M,
        address: usize,
        handler: Handler,
        handler_name: &'static str,
    ) -> Result<(), BreakpointError> {
        let size = self.arch.trap_size();
        let sibling = address + size;
        let uses_sibling = self.arch.rearm.uses_sibling();

        self.table.check_free(address, handler_name)?;
        if uses_sibling {
            self.table.check_free(sibling, handler_name)?;
        }

        let patcher = Patcher::new(memory, self.arch.trap_opcode);
        let sibling_bytes = if uses_sibling {
            Some(patcher.save(sibling, size)?)
        } else {
            None
        };
        let saved_bytes = patcher.install(address, size)?;

        log::info!(
            "Breakpoint at {:#x} -> {} (saved {})",
            address,
            handler_name,
            hex::encode(&saved_bytes)
        );

        self.table.register(BreakpointRecord {
            address,
            handler,
            handler_name,
            trap_size: size as isize,
            saved_bytes,
        })?;

        if let Some(saved_bytes) = sibling_bytes {
            log::debug!("Sibling slot at {:#x} for {:#x}", sibling, address);
            self.table.register(BreakpointRecord {
                address: sibling,
                handler: Arc::new(nop),
                handler_name: "<sibling>",
                trap_size: -(size as isize),
                saved_bytes,
            })?;
        }

        Ok(())
    }
}
