//! A trap opcode with no breakpoint record behind it (stale or corrupted
//! code) is reported as undefined and re-faults on the opcode until the
//! original byte is back, without taking the process down.

#![cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "x86")
))]

use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

static HITS: AtomicUsize = AtomicUsize::new(0);

#[inline(never)]
extern "C" fn traced(x: i32) -> i32 {
    x.wrapping_add(1)
}

#[inline(never)]
extern "C" fn stray(x: i32) -> i32 {
    x.wrapping_mul(3)
}

#[test]
fn test_stray_trap_refaults_until_repaired() {
    unsafe {
        softbreak::try_install(traced as *const () as usize, |_ctx: &softbreak::TrapContext<'_>| {
            HITS.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    let address = stray as *const () as usize;
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    let start = address & !(page - 1);
    let rc = unsafe {
        libc::mprotect(
            start as *mut libc::c_void,
            2 * page,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )
    };
    assert_eq!(rc, 0);

    // int3 over the first byte, with no record in the table
    let original = unsafe { std::ptr::read_volatile(address as *const u8) };
    unsafe { std::ptr::write_volatile(address as *mut u8, 0xcc) };

    let repair = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        unsafe { std::ptr::write_volatile(address as *mut u8, original) };
    });

    // Spins on the stray trap until the byte is repaired, then runs from
    // the start of the instruction
    assert_eq!(stray(black_box(14)), 42);
    repair.join().unwrap();

    let stats = softbreak::trap_stats().unwrap();
    assert!(stats.undefined >= 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(HITS.load(Ordering::SeqCst), 0);

    assert_eq!(traced(black_box(41)), 42);
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert_eq!(softbreak::trap_stats().unwrap().hits, 1);
}
