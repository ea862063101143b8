//! Memory - Code memory operations
//!
//! Provides read/write access to instruction bytes and code page protection.
//! `LiveMemory` is the only place raw code pointers are dereferenced.

use thiserror::Error;

/// Memory operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Failed to change protection of {address:#x} (+{size}): {reason}")]
    ProtectFailed {
        address: usize,
        size: usize,
        reason: String,
    },

    #[error("Failed to query page size: {0}")]
    PageSize(String),

    #[error("Invalid memory region: {address:#x} (+{size})")]
    InvalidRegion { address: usize, size: usize },
}

/// Memory protection flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryProtection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl MemoryProtection {
    pub const RWX: Self = Self {
        read: true,
        write: true,
        execute: true,
    };
}

/// Byte-level access to code the breakpoints patch
pub trait CodeMemory {
    /// Change protection of every page overlapping `[address, address + size)`
    fn protect(
        &self,
        address: usize,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<(), MemoryError>;

    /// Copy `buffer.len()` bytes starting at `address` into `buffer`
    fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), MemoryError>;

    /// Overwrite code at `address` with `data`
    fn write(&self, address: usize, data: &[u8]) -> Result<(), MemoryError>;
}

/// Round `[address, address + size)` out to whole pages
pub fn page_span(address: usize, size: usize, page_size: usize) -> (usize, usize) {
    let start = address & !(page_size - 1);
    let end = (address + size + page_size - 1) & !(page_size - 1);
    (start, end - start)
}

/// Code of the current process
#[cfg(softbreak_native)]
pub struct LiveMemory {
    page_size: usize,
}

#[cfg(softbreak_native)]
impl LiveMemory {
    /// # Safety
    ///
    /// Every address later passed to this memory must belong to mapped code
    /// of the current process, and no other thread may execute a range
    /// while it is rewritten.
    pub unsafe fn new() -> Result<Self, MemoryError> {
        use nix::unistd::{sysconf, SysconfVar};

        let page_size = sysconf(SysconfVar::PAGE_SIZE)
            .map_err(|e| MemoryError::PageSize(e.to_string()))?
            .ok_or_else(|| MemoryError::PageSize("no limit reported".into()))?;

        Ok(Self {
            page_size: page_size as usize,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(softbreak_native)]
impl CodeMemory for LiveMemory {
    fn protect(
        &self,
        address: usize,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<(), MemoryError> {
        use nix::sys::mman::{mprotect, ProtFlags};
        use std::ptr::NonNull;

        let (start, len) = page_span(address, size, self.page_size);
        let mut flags = ProtFlags::PROT_NONE;
        if protection.read {
            flags |= ProtFlags::PROT_READ;
        }
        if protection.write {
            flags |= ProtFlags::PROT_WRITE;
        }
        if protection.execute {
            flags |= ProtFlags::PROT_EXEC;
        }

        let page = NonNull::new(start as *mut std::ffi::c_void)
            .ok_or(MemoryError::InvalidRegion { address, size })?;

        // SAFETY: the range is page aligned and covers code the caller of
        // `LiveMemory::new` vouched for.
        unsafe {
            mprotect(page, len, flags).map_err(|e| MemoryError::ProtectFailed {
                address,
                size,
                reason: e.to_string(),
            })?;
        }

        log::trace!("mprotect {:#x} (+{:#x}) -> {:?}", start, len, protection);
        Ok(())
    }

    fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), MemoryError> {
        if address == 0 {
            return Err(MemoryError::InvalidRegion {
                address,
                size: buffer.len(),
            });
        }

        // SAFETY: see `LiveMemory::new`.
        unsafe {
            std::ptr::copy_nonoverlapping(address as *const u8, buffer.as_mut_ptr(), buffer.len());
        }
        Ok(())
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<(), MemoryError> {
        if address == 0 {
            return Err(MemoryError::InvalidRegion {
                address,
                size: data.len(),
            });
        }

        // SAFETY: see `LiveMemory::new`. The page was widened to RWX by
        // `protect` before the first write.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), address as *mut u8, data.len());
        }
        crate::arch::sync_icache(address, data.len());
        Ok(())
    }
}

/// In-memory code buffer for exercising patching and dispatch
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    pub struct FakeCode {
        base: usize,
        bytes: RefCell<Vec<u8>>,
        protected: RefCell<Vec<(usize, usize, MemoryProtection)>>,
    }

    impl FakeCode {
        /// `len` bytes of code at `base`, filled with a recognisable pattern
        pub fn new(base: usize, len: usize) -> Self {
            Self {
                base,
                bytes: RefCell::new((0..len).map(|i| (i as u8).wrapping_mul(7) | 1).collect()),
                protected: RefCell::new(Vec::new()),
            }
        }

        pub fn bytes_at(&self, address: usize, len: usize) -> Vec<u8> {
            let offset = address - self.base;
            self.bytes.borrow()[offset..offset + len].to_vec()
        }

        pub fn protect_calls(&self) -> Vec<(usize, usize, MemoryProtection)> {
            self.protected.borrow().clone()
        }

        fn range(&self, address: usize, size: usize) -> Result<std::ops::Range<usize>, MemoryError> {
            let len = self.bytes.borrow().len();
            match address.checked_sub(self.base) {
                Some(offset) if offset + size <= len => Ok(offset..offset + size),
                _ => Err(MemoryError::InvalidRegion { address, size }),
            }
        }
    }

    impl CodeMemory for FakeCode {
        fn protect(
            &self,
            address: usize,
            size: usize,
            protection: MemoryProtection,
        ) -> Result<(), MemoryError> {
            self.range(address, size)?;
            self.protected.borrow_mut().push((address, size, protection));
            Ok(())
        }

        fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), MemoryError> {
            let range = self.range(address, buffer.len())?;
            buffer.copy_from_slice(&self.bytes.borrow()[range]);
            Ok(())
        }

        fn write(&self, address: usize, data: &[u8]) -> Result<(), MemoryError> {
            let range = self.range(address, data.len())?;
            self.bytes.borrow_mut()[range].copy_from_slice(data);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_span() {
        assert_eq!(page_span(0x1000, 1, 0x1000), (0x1000, 0x1000));
        assert_eq!(page_span(0x1ffe, 4, 0x1000), (0x1000, 0x2000));
        assert_eq!(page_span(0x2fff, 1, 0x1000), (0x2000, 0x1000));
    }

    #[cfg(softbreak_native)]
    #[test]
    fn test_live_memory_reads_code() {
        #[inline(never)]
        fn sample() -> u32 {
            42
        }

        let memory = unsafe { LiveMemory::new() }.unwrap();
        assert!(memory.page_size().is_power_of_two());

        let mut buffer = [0u8; 4];
        memory.read(sample as *const () as usize, &mut buffer).unwrap();
        let expected = unsafe { std::slice::from_raw_parts(sample as *const u8, 4) };
        assert_eq!(&buffer, expected);
    }
}
