//! Trap dispatch - the re-arming state machine.
//!
//! A breakpoint costs two traps per hit:
//! - the trap opcode itself: restore the original bytes and run the handler
//! - a follow-up trap after the original instruction executed: put the trap
//!   opcode back
//!
//! Single-step architectures get the follow-up trap from the CPU flag.
//! Sibling-trap architectures plant a second trap on the next instruction.

use std::sync::Arc;

use super::context::TrapContext;
use super::state::{PendingRearm, TrapState};
use super::types::{Handler, TrapEvent};
use crate::arch::{RearmStrategy, TrapFrame};
use crate::core::{CodeMemory, MemoryError, Patcher};

impl TrapState {
    /// Handle one SIGTRAP delivered with `frame`
    pub fn handle_trap<F: TrapFrame, M: CodeMemory>(&mut self, frame: &mut F, memory: &M) -> TrapEvent {
        match self.arch.rearm {
            RearmStrategy::SingleStep { flag_mask } => self.single_step_trap(frame, memory, flag_mask),
            RearmStrategy::SiblingTrap => self.sibling_trap(frame, memory),
        }
    }

    fn single_step_trap<F: TrapFrame, M: CodeMemory>(
        &mut self,
        frame: &mut F,
        memory: &M,
        flag_mask: usize,
    ) -> TrapEvent {
        let patcher = Patcher::new(memory, self.arch.trap_opcode);

        if let Some(PendingRearm { address }) = self.pending.take() {
            let flags = frame.flags().unwrap_or(0);
            if flags & flag_mask == 0 {
                log::warn!("Re-arm trap for {:#x} without single-step flag set", address);
            }
            frame.set_flags(flags & !flag_mask);

            return match patcher.reinstall(address) {
                Ok(()) => self.rearmed(address),
                Err(e) => self.failed(address, e),
            };
        }

        // The trap opcode has already been consumed: PC is past it. An
        // unmatched trap resumes on the opcode and faults again.
        let address = frame.pc().wrapping_sub(self.arch.rearm.pc_adjust(patcher.trap_size()));
        frame.set_pc(address);

        let (handler, restored) = match self.table.lookup(address) {
            Some(bp) => (Arc::clone(&bp.handler), patcher.restore(address, &bp.saved_bytes)),
            None => return self.undefined(address),
        };
        if let Err(e) = restored {
            return self.failed(address, e);
        }

        invoke(&handler, frame);

        let flags = frame.flags().unwrap_or(0);
        frame.set_flags(flags | flag_mask);
        self.pending = Some(PendingRearm { address });

        self.stats.hits += 1;
        log::debug!("Breakpoint {:#x} hit, single-stepping", address);
        TrapEvent::BreakpointHit { address }
    }

    fn sibling_trap<F: TrapFrame, M: CodeMemory>(&mut self, frame: &mut F, memory: &M) -> TrapEvent {
        let patcher = Patcher::new(memory, self.arch.trap_opcode);
        let address = frame.pc();

        let (handler, is_sibling, partner, restored) = match self.table.lookup(address) {
            Some(bp) => (
                Arc::clone(&bp.handler),
                bp.is_sibling(),
                bp.partner_address(),
                patcher.restore(address, &bp.saved_bytes),
            ),
            None => return self.undefined(address),
        };
        if let Err(e) = restored {
            return self.failed(address, e);
        }

        invoke(&handler, frame);

        // A primary arms its sibling slot; a sibling re-arms its primary.
        if let Err(e) = patcher.reinstall(partner) {
            return self.failed(address, e);
        }

        if is_sibling {
            self.rearmed(partner)
        } else {
            self.stats.hits += 1;
            log::debug!("Breakpoint {:#x} hit, sibling armed at {:#x}", address, partner);
            TrapEvent::BreakpointHit { address }
        }
    }

    fn rearmed(&mut self, address: usize) -> TrapEvent {
        self.stats.rearms += 1;
        log::trace!("Breakpoint {:#x} re-armed", address);
        TrapEvent::Rearmed { address }
    }

    fn undefined(&mut self, address: usize) -> TrapEvent {
        self.stats.undefined += 1;
        log::warn!("Undefined breakpoint at {:#x}.", address);
        TrapEvent::Undefined { address }
    }

    fn failed(&mut self, address: usize, error: MemoryError) -> TrapEvent {
        log::error!("Breakpoint {:#x}: {}", address, error);
        TrapEvent::Failed {
            address,
            reason: error.to_string(),
        }
    }
}

fn invoke<F: TrapFrame>(handler: &Handler, frame: &F) {
    let ctx = TrapContext::new(frame);
    handler(&ctx);
}
