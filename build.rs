//! softbreak Build Script
//!
//! Detects whether the target has a known `ucontext_t` layout and trap
//! opcode. Supported hosts get the `softbreak_native` cfg, which enables the
//! live signal handler and code patching. Everything else builds the
//! portable dispatch logic only.

use std::env;

const SUPPORTED_ARCHES: &[&str] = &["x86_64", "x86", "aarch64", "arm"];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(softbreak_native)");

    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if os == "linux" && SUPPORTED_ARCHES.contains(&arch.as_str()) {
        println!("cargo:rustc-cfg=softbreak_native");
    } else {
        println!(
            "cargo:warning=softbreak: no trap support for {}-{}. Building dispatch logic only.",
            arch, os
        );
    }
}
