//! Read-only view of the machine state at a breakpoint.

use crate::arch::TrapFrame;

/// Register snapshot handed to breakpoint handlers.
///
/// Borrowed from the trap frame for the duration of one handler call.
#[derive(Clone, Copy)]
pub struct TrapContext<'a> {
    frame: &'a dyn TrapFrame,
}

impl<'a> TrapContext<'a> {
    pub fn new(frame: &'a dyn TrapFrame) -> Self {
        Self { frame }
    }

    /// Address of the breakpoint that fired
    pub fn pc(&self) -> usize {
        self.frame.pc()
    }

    /// Processor flags, on architectures that have a flags word
    pub fn flags(&self) -> Option<usize> {
        self.frame.flags()
    }

    /// Integer call argument `index`, per the native calling convention
    pub fn argument(&self, index: usize) -> usize {
        self.frame.argument(index)
    }
}

/// First integer argument of the trapped call
pub fn first_argument(ctx: &TrapContext<'_>) -> usize {
    ctx.argument(0)
}

/// Second integer argument of the trapped call
pub fn second_argument(ctx: &TrapContext<'_>) -> usize {
    ctx.argument(1)
}
