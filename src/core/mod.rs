//! Core module - low-level code patching
//!
//! This module contains code memory access and the trap opcode patcher.
//! It is the unsafe boundary of the crate: nothing above it touches raw
//! code pointers.

pub mod memory;
pub mod patcher;

// Re-export common types
pub use memory::{CodeMemory, MemoryError, MemoryProtection};
pub use patcher::Patcher;
