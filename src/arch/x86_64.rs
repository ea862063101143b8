//! x86_64: `int3` traps, TF single-step, System V argument registers.

use super::{ArchSpec, RearmStrategy};

/// RFLAGS.TF
pub const TRAP_FLAG: usize = 0x100;

pub const SPEC: ArchSpec = ArchSpec {
    name: "x86_64",
    trap_opcode: &[0xcc],
    rearm: RearmStrategy::SingleStep {
        flag_mask: TRAP_FLAG,
    },
};

#[cfg(all(softbreak_native, target_arch = "x86_64"))]
pub(super) mod regs {
    use libc::{greg_t, mcontext_t, REG_EFL, REG_RDI, REG_RIP, REG_RSI};

    const ARGUMENT_REGS: [libc::c_int; 2] = [REG_RDI, REG_RSI];

    pub fn pc(mc: &mcontext_t) -> usize {
        mc.gregs[REG_RIP as usize] as usize
    }

    pub fn set_pc(mc: &mut mcontext_t, pc: usize) {
        mc.gregs[REG_RIP as usize] = pc as greg_t;
    }

    pub fn flags(mc: &mcontext_t) -> Option<usize> {
        Some(mc.gregs[REG_EFL as usize] as usize)
    }

    pub fn set_flags(mc: &mut mcontext_t, flags: usize) {
        mc.gregs[REG_EFL as usize] = flags as greg_t;
    }

    pub fn argument(mc: &mcontext_t, index: usize) -> usize {
        match ARGUMENT_REGS.get(index) {
            Some(&reg) => mc.gregs[reg as usize] as usize,
            None => 0,
        }
    }

    /// Instruction fetch is coherent with stores on x86
    pub fn sync_icache(_address: usize, _len: usize) {}
}
