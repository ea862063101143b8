//! SIGTRAP delivery and the registration entry points.
//!
//! The process-wide `TrapState` lives in a static spin lock that is only
//! ever entered with `try_lock`: a trap taken while the state is in use (for
//! example a handler calling `install`) is refused instead of deadlocking
//! inside the signal handler.

use std::ffi::c_void;
use std::sync::Arc;

use libc::{c_int, siginfo_t, ucontext_t};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use spin::Mutex;

use super::context::TrapContext;
use super::state::TrapState;
use super::types::{BreakpointError, TrapStats};
use crate::arch::{self, MachineContext, TrapFrame};
use crate::core::memory::LiveMemory;

/// Everything the signal handler needs
struct Runtime {
    state: TrapState,
    memory: LiveMemory,
}

impl Runtime {
    fn init() -> Result<Self, BreakpointError> {
        // SAFETY: callers of `try_install` vouch for the addresses patched.
        let memory = unsafe { LiveMemory::new() }?;
        register_signal_handler()?;

        log::info!(
            "SIGTRAP handler installed for {} (page size {:#x})",
            arch::NATIVE,
            memory.page_size()
        );

        Ok(Self {
            state: TrapState::new(arch::NATIVE),
            memory,
        })
    }
}

static STATE: Mutex<Option<Runtime>> = Mutex::new(None);

fn register_signal_handler() -> Result<(), BreakpointError> {
    let action = SigAction::new(
        SigHandler::SigAction(on_sigtrap),
        SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );

    // SAFETY: `on_sigtrap` only reaches shared state through `STATE`.
    unsafe { sigaction(Signal::SIGTRAP, &action) }
        .map(drop)
        .map_err(|e| BreakpointError::SignalSetup(e.to_string()))
}

/// `si_code` values of a SIGTRAP sent by `kill`/`raise` rather than the CPU
const SI_USER: c_int = 0;
const SI_TKILL: c_int = -6;

fn sent_by_user(info: *const siginfo_t) -> bool {
    // SAFETY: SA_SIGINFO handlers receive a valid siginfo_t or null.
    match unsafe { info.as_ref() } {
        Some(info) => matches!(info.si_code, SI_USER | SI_TKILL),
        None => false,
    }
}

extern "C" fn on_sigtrap(_signum: c_int, info: *mut siginfo_t, context: *mut c_void) {
    if sent_by_user(info) {
        return;
    }

    // SAFETY: SA_SIGINFO handlers receive the interrupted ucontext_t.
    let Some(uc) = (unsafe { context.cast::<ucontext_t>().as_mut() }) else {
        return;
    };
    let mut frame = MachineContext::new(uc);

    let handled = STATE.try_lock().map(|mut slot| {
        slot.as_mut()
            .map(|rt| rt.state.handle_trap(&mut frame, &rt.memory))
    });

    match handled {
        Some(Some(event)) => log::trace!("SIGTRAP: {:?}", event),
        Some(None) => log::warn!("SIGTRAP at {:#x} before any breakpoint was set", frame.pc()),
        None => log::error!("SIGTRAP at {:#x} while breakpoint state was busy", frame.pc()),
    }
}

/// Set a breakpoint at `address`, reporting every failure.
///
/// The first call registers the SIGTRAP handler. `handler` runs on the
/// faulting thread with SIGTRAP blocked, so it must not execute code that
/// carries a breakpoint itself. SIGTRAPs sent with `kill` or `raise` are
/// ignored.
///
/// Trap handling logs through `log` from inside the signal handler. With a
/// logger that locks or allocates (such as `env_logger`), instrumented code
/// must not be reached while the interrupted thread is itself logging or
/// allocating.
///
/// # Safety
///
/// `address` must be the first byte of an instruction in mapped code of
/// this process, and no other thread may run instrumented code.
pub unsafe fn try_install<F>(address: usize, handler: F) -> Result<(), BreakpointError>
where
    F: Fn(&TrapContext<'_>) + Send + Sync + 'static,
{
    let handler_name = std::any::type_name::<F>();

    let mut slot = STATE.try_lock().ok_or(BreakpointError::Busy)?;
    let runtime = match slot.take() {
        Some(rt) => rt,
        None => Runtime::init()?,
    };
    let rt = slot.insert(runtime);
    rt.state
        .register(&rt.memory, address, Arc::new(handler), handler_name)
}

/// Set a breakpoint at `address`.
///
/// A conflicting registration is logged and dropped. Failure to register
/// the signal handler or to make the code writable aborts the process.
///
/// # Safety
///
/// Same contract as [`try_install`].
pub unsafe fn install<F>(address: usize, handler: F)
where
    F: Fn(&TrapContext<'_>) + Send + Sync + 'static,
{
    // SAFETY: forwarded from the caller.
    match unsafe { try_install(address, handler) } {
        Ok(()) => {}
        Err(e) if e.is_environment_failure() => {
            log::error!("{}", e);
            std::process::abort();
        }
        Err(e) => log::warn!("{}", e),
    }
}

/// Trap counters, `None` before the first registration
pub fn trap_stats() -> Option<TrapStats> {
    STATE
        .try_lock()
        .and_then(|slot| slot.as_ref().map(|rt| rt.state.stats()))
}
