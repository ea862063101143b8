//! Architecture module - trap opcodes, re-arming strategy and register access.
//!
//! Every hardware-specific fact lives here:
//! - Trap opcode bytes
//! - How a trap is re-armed after the original instruction ran
//! - Where the PC, flags word and call arguments sit in `ucontext_t`
//!
//! The descriptors are plain data and available on every host. The register
//! accessors are only compiled for the host the crate is built for.

pub mod aarch64;
pub mod arm;
pub mod x86;
pub mod x86_64;

use std::fmt;

/// How a breakpoint is re-armed once its original instruction has executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmStrategy {
    /// The CPU has a flag that traps again after exactly one instruction.
    /// The trap leaves the PC just past the opcode.
    SingleStep { flag_mask: usize },

    /// No single-step flag. A second trap is written at the following
    /// instruction to regain control. The trap leaves the PC on the opcode.
    SiblingTrap,
}

impl RearmStrategy {
    /// Distance between the reported PC and the trap opcode that raised it
    pub fn pc_adjust(&self, trap_size: usize) -> usize {
        match self {
            RearmStrategy::SingleStep { .. } => trap_size,
            RearmStrategy::SiblingTrap => 0,
        }
    }

    pub fn uses_sibling(&self) -> bool {
        matches!(self, RearmStrategy::SiblingTrap)
    }
}

/// Capability descriptor for one target architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchSpec {
    /// Short architecture name, for diagnostics
    pub name: &'static str,
    /// Bytes written over the instruction to raise SIGTRAP
    pub trap_opcode: &'static [u8],
    /// Re-arming model the CPU supports
    pub rearm: RearmStrategy,
}

impl ArchSpec {
    /// Size of the trap opcode in bytes
    pub const fn trap_size(&self) -> usize {
        self.trap_opcode.len()
    }
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.rearm {
            RearmStrategy::SingleStep { .. } => "single-step",
            RearmStrategy::SiblingTrap => "sibling-trap",
        };
        write!(f, "{} ({}, trap {})", self.name, mode, hex::encode(self.trap_opcode))
    }
}

/// Abstract view of the machine state delivered with a trap.
///
/// The dispatch state machine is written against this trait only.
pub trait TrapFrame {
    /// Program counter as reported by the kernel
    fn pc(&self) -> usize;

    fn set_pc(&mut self, pc: usize);

    /// Processor flags word, `None` if the architecture exposes none
    fn flags(&self) -> Option<usize>;

    /// Overwrite the flags word. Ignored where there is no flags word.
    fn set_flags(&mut self, flags: usize);

    /// Integer call argument `index` (0-based) under the native calling convention
    fn argument(&self, index: usize) -> usize;
}

#[cfg(all(softbreak_native, target_arch = "x86_64"))]
use self::x86_64::regs as native_regs;
#[cfg(all(softbreak_native, target_arch = "x86"))]
use self::x86::regs as native_regs;
#[cfg(all(softbreak_native, target_arch = "aarch64"))]
use self::aarch64::regs as native_regs;
#[cfg(all(softbreak_native, target_arch = "arm"))]
use self::arm::regs as native_regs;

#[cfg(all(softbreak_native, target_arch = "x86_64"))]
pub const NATIVE: ArchSpec = x86_64::SPEC;
#[cfg(all(softbreak_native, target_arch = "x86"))]
pub const NATIVE: ArchSpec = x86::SPEC;
#[cfg(all(softbreak_native, target_arch = "aarch64"))]
pub const NATIVE: ArchSpec = aarch64::SPEC;
#[cfg(all(softbreak_native, target_arch = "arm"))]
pub const NATIVE: ArchSpec = arm::SPEC;

/// Make freshly written code visible to instruction fetch
#[cfg(softbreak_native)]
pub(crate) fn sync_icache(address: usize, len: usize) {
    native_regs::sync_icache(address, len);
}

/// The `ucontext_t` delivered to the SIGTRAP handler
#[cfg(softbreak_native)]
pub struct MachineContext<'a> {
    uc: &'a mut libc::ucontext_t,
}

#[cfg(softbreak_native)]
impl<'a> MachineContext<'a> {
    pub fn new(uc: &'a mut libc::ucontext_t) -> Self {
        Self { uc }
    }
}

#[cfg(softbreak_native)]
impl TrapFrame for MachineContext<'_> {
    fn pc(&self) -> usize {
        native_regs::pc(&self.uc.uc_mcontext)
    }

    fn set_pc(&mut self, pc: usize) {
        native_regs::set_pc(&mut self.uc.uc_mcontext, pc);
    }

    fn flags(&self) -> Option<usize> {
        native_regs::flags(&self.uc.uc_mcontext)
    }

    fn set_flags(&mut self, flags: usize) {
        native_regs::set_flags(&mut self.uc.uc_mcontext, flags);
    }

    fn argument(&self, index: usize) -> usize {
        native_regs::argument(&self.uc.uc_mcontext, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pc_adjust_follows_strategy() {
        assert_eq!(x86_64::SPEC.rearm.pc_adjust(x86_64::SPEC.trap_size()), 1);
        assert_eq!(aarch64::SPEC.rearm.pc_adjust(aarch64::SPEC.trap_size()), 0);
        assert!(arm::SPEC.rearm.uses_sibling());
        assert!(!x86::SPEC.rearm.uses_sibling());
    }

    #[test]
    fn test_display() {
        assert_eq!(x86_64::SPEC.to_string(), "x86_64 (single-step, trap cc)");
        assert_eq!(aarch64::SPEC.to_string(), "aarch64 (sibling-trap, trap 000020d4)");
    }

    #[cfg(softbreak_native)]
    #[test]
    fn test_native_matches_target() {
        assert_eq!(NATIVE.name, std::env::consts::ARCH);
    }
}
