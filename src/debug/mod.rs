//! Debug module - in-process breakpoints.
//!
//! Provides:
//! - Breakpoint registration
//! - The SIGTRAP dispatch state machine
//! - Register access for breakpoint handlers

pub mod context;
pub mod handler;
pub mod state;
pub mod table;
pub mod types;

#[cfg(softbreak_native)]
pub mod signal;


pub use context::{first_argument, second_argument, TrapContext};
pub use state::{PendingRearm, TrapState};
pub use table::BreakpointTable;
pub use types::{BreakpointError, BreakpointRecord, Handler, TrapEvent, TrapStats};

#[cfg(softbreak_native)]
pub use signal::{install, trap_stats, try_install};
