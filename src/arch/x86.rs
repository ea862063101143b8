//! x86 (i686): `int3` traps, TF single-step, cdecl stack arguments.

use super::{ArchSpec, RearmStrategy};

/// EFLAGS.TF
pub const TRAP_FLAG: usize = 0x100;

pub const SPEC: ArchSpec = ArchSpec {
    name: "x86",
    trap_opcode: &[0xcc],
    rearm: RearmStrategy::SingleStep {
        flag_mask: TRAP_FLAG,
    },
};

#[cfg(all(softbreak_native, target_arch = "x86"))]
pub(super) mod regs {
    use libc::{greg_t, mcontext_t};

    // Indices into `gregs`, see <sys/ucontext.h>
    const REG_ESP: usize = 7;
    const REG_EIP: usize = 14;
    const REG_EFL: usize = 16;

    pub fn pc(mc: &mcontext_t) -> usize {
        mc.gregs[REG_EIP] as usize
    }

    pub fn set_pc(mc: &mut mcontext_t, pc: usize) {
        mc.gregs[REG_EIP] = pc as greg_t;
    }

    pub fn flags(mc: &mcontext_t) -> Option<usize> {
        Some(mc.gregs[REG_EFL] as usize)
    }

    pub fn set_flags(mc: &mut mcontext_t, flags: usize) {
        mc.gregs[REG_EFL] = flags as greg_t;
    }

    /// Arguments sit on the stack above the return address.
    ///
    /// Only meaningful at a function's first instruction, before the
    /// prologue moves `esp`.
    pub fn argument(mc: &mcontext_t, index: usize) -> usize {
        let esp = mc.gregs[REG_ESP] as usize as *const usize;
        // SAFETY: at a trapped call site esp points at the return address of
        // a live frame, and the caller's argument slots follow it.
        unsafe { esp.add(1 + index).read() }
    }

    /// Instruction fetch is coherent with stores on x86
    pub fn sync_icache(_address: usize, _len: usize) {}
}
