//! Patcher - writes and removes trap opcodes.
//!
//! Page protection is widened to RWX the first time a range is patched and
//! never narrowed again. Those pages stay writable for the life of the process.

use super::memory::{CodeMemory, MemoryError, MemoryProtection};

pub struct Patcher<'m, M: CodeMemory> {
    memory: &'m M,
    trap_opcode: &'static [u8],
}

impl<'m, M: CodeMemory> Patcher<'m, M> {
    pub fn new(memory: &'m M, trap_opcode: &'static [u8]) -> Self {
        Self {
            memory,
            trap_opcode,
        }
    }

    pub fn trap_size(&self) -> usize {
        self.trap_opcode.len()
    }

    /// Widen protection and save `size` bytes at `address`, leaving them intact
    pub fn save(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError> {
        self.memory.protect(address, size, MemoryProtection::RWX)?;

        let mut saved = vec![0u8; size];
        self.memory.read(address, &mut saved)?;
        Ok(saved)
    }

    /// Save the original bytes at `address` and write the trap opcode over them
    pub fn install(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError> {
        let saved = self.save(address, size)?;
        self.reinstall(address)?;

        log::trace!(
            "trap at {:#x}: {} -> {}",
            address,
            hex::encode(&saved),
            hex::encode(self.trap_opcode)
        );
        Ok(saved)
    }

    /// Put the original instruction bytes back
    pub fn restore(&self, address: usize, saved: &[u8]) -> Result<(), MemoryError> {
        self.memory.write(address, saved)
    }

    /// Re-arm a trap whose original bytes were already saved
    pub fn reinstall(&self, address: usize) -> Result<(), MemoryError> {
        self.memory.write(address, self.trap_opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64;
    use crate::core::memory::testing::FakeCode;

    #[test]
    fn test_install_saves_and_patches() {
        let code = FakeCode::new(0x4000, 32);
        let original = code.bytes_at(0x4008, 4);
        let patcher = Patcher::new(&code, aarch64::SPEC.trap_opcode);

        let saved = patcher.install(0x4008, 4).unwrap();

        assert_eq!(saved, original);
        assert_eq!(code.bytes_at(0x4008, 4), aarch64::SPEC.trap_opcode);
        assert_eq!(code.protect_calls(), vec![(0x4008, 4, MemoryProtection::RWX)]);
    }

    #[test]
    fn test_restore_and_reinstall() {
        let code = FakeCode::new(0x4000, 32);
        let patcher = Patcher::new(&code, aarch64::SPEC.trap_opcode);
        let saved = patcher.install(0x4010, 4).unwrap();

        patcher.restore(0x4010, &saved).unwrap();
        assert_eq!(code.bytes_at(0x4010, 4), saved);

        patcher.reinstall(0x4010).unwrap();
        assert_eq!(code.bytes_at(0x4010, 4), aarch64::SPEC.trap_opcode);
    }

    #[test]
    fn test_save_leaves_code_untouched() {
        let code = FakeCode::new(0x4000, 32);
        let before = code.bytes_at(0x4000, 32);
        let patcher = Patcher::new(&code, aarch64::SPEC.trap_opcode);

        let saved = patcher.save(0x4004, 4).unwrap();

        assert_eq!(saved, before[4..8].to_vec());
        assert_eq!(code.bytes_at(0x4000, 32), before);
    }

    #[test]
    fn test_out_of_range_is_reported() {
        let code = FakeCode::new(0x4000, 8);
        let patcher = Patcher::new(&code, aarch64::SPEC.trap_opcode);

        let err = patcher.install(0x4006, 4).unwrap_err();
        assert_eq!(
            err,
            MemoryError::InvalidRegion {
                address: 0x4006,
                size: 4
            }
        );
    }
}
