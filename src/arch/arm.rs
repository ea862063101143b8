//! 32-bit ARM (A32): `udf` traps, sibling re-arming, AAPCS argument registers.
//!
//! Thumb code is not supported: the trap opcode is an A32 encoding.

use super::{ArchSpec, RearmStrategy};

pub const SPEC: ArchSpec = ArchSpec {
    name: "arm",
    // udf #0x1f0 - the kernel's ARM breakpoint instruction
    trap_opcode: &[0xf0, 0x01, 0xf0, 0xe7],
    rearm: RearmStrategy::SiblingTrap,
};

#[cfg(all(softbreak_native, target_arch = "arm"))]
pub(super) mod regs {
    use libc::{c_ulong, mcontext_t};

    // __ARM_NR_cacheflush
    const SYS_CACHEFLUSH: libc::c_long = 0x0f0002;

    pub fn pc(mc: &mcontext_t) -> usize {
        mc.arm_pc as usize
    }

    pub fn set_pc(mc: &mut mcontext_t, pc: usize) {
        mc.arm_pc = pc as c_ulong;
    }

    pub fn flags(_mc: &mcontext_t) -> Option<usize> {
        None
    }

    pub fn set_flags(_mc: &mut mcontext_t, _flags: usize) {}

    pub fn argument(mc: &mcontext_t, index: usize) -> usize {
        match index {
            0 => mc.arm_r0 as usize,
            1 => mc.arm_r1 as usize,
            2 => mc.arm_r2 as usize,
            3 => mc.arm_r3 as usize,
            _ => 0,
        }
    }

    pub fn sync_icache(address: usize, len: usize) {
        // SAFETY: cacheflush only performs cache maintenance on the range.
        let rc = unsafe { libc::syscall(SYS_CACHEFLUSH, address, address + len, 0) };
        if rc != 0 {
            log::warn!("cacheflush({:#x}, {}) failed", address, len);
        }
    }
}
