//! aarch64: `brk #0` traps, sibling re-arming, AAPCS64 argument registers.

use super::{ArchSpec, RearmStrategy};

pub const SPEC: ArchSpec = ArchSpec {
    name: "aarch64",
    // brk #0
    trap_opcode: &[0x00, 0x00, 0x20, 0xd4],
    rearm: RearmStrategy::SiblingTrap,
};

#[cfg(all(softbreak_native, target_arch = "aarch64"))]
pub(super) mod regs {
    use libc::mcontext_t;
    use std::arch::asm;

    pub fn pc(mc: &mcontext_t) -> usize {
        mc.pc as usize
    }

    pub fn set_pc(mc: &mut mcontext_t, pc: usize) {
        mc.pc = pc as u64;
    }

    pub fn flags(_mc: &mcontext_t) -> Option<usize> {
        None
    }

    pub fn set_flags(_mc: &mut mcontext_t, _flags: usize) {}

    pub fn argument(mc: &mcontext_t, index: usize) -> usize {
        mc.regs.get(index).map(|&r| r as usize).unwrap_or(0)
    }

    /// Clean D-cache and invalidate I-cache lines covering the range
    pub fn sync_icache(address: usize, len: usize) {
        let ctr: u64;
        // SAFETY: CTR_EL0 is readable from EL0 on Linux.
        unsafe { asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack)) };
        let dline = 4usize << ((ctr >> 16) & 0xf);
        let iline = 4usize << (ctr & 0xf);
        let end = address + len;

        let mut line = address & !(dline - 1);
        while line < end {
            // SAFETY: cache maintenance on a mapped code range.
            unsafe { asm!("dc cvau, {}", in(reg) line, options(nostack)) };
            line += dline;
        }
        unsafe { asm!("dsb ish", options(nostack)) };

        let mut line = address & !(iline - 1);
        while line < end {
            unsafe { asm!("ic ivau, {}", in(reg) line, options(nostack)) };
            line += iline;
        }
        unsafe { asm!("dsb ish", "isb", options(nostack)) };
    }
}
