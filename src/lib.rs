//! softbreak - in-process software breakpoints
//!
//! Patches a trap opcode over an instruction, catches the resulting SIGTRAP
//! in the same process, runs a callback with the register snapshot and then
//! resumes the original code as if nothing happened.
//!
//! ```no_run
//! use softbreak::{first_argument, install, TrapContext};
//!
//! #[inline(never)]
//! extern "C" fn square(x: i32) -> i32 {
//!     x * x
//! }
//!
//! unsafe {
//!     install(square as *const () as usize, |ctx: &TrapContext<'_>| {
//!         println!("square({})", first_argument(ctx) as i32);
//!     });
//! }
//! assert_eq!(square(3), 9);
//! ```

pub mod arch;
pub mod core;
pub mod debug;

pub use arch::{ArchSpec, RearmStrategy, TrapFrame};
pub use debug::{
    first_argument, second_argument, BreakpointError, TrapContext, TrapEvent, TrapStats,
};

#[cfg(softbreak_native)]
pub use arch::NATIVE;
#[cfg(softbreak_native)]
pub use debug::{install, trap_stats, try_install};
