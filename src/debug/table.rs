//! Breakpoint table - registry of patched addresses.

use super::types::{BreakpointError, BreakpointRecord};

/// Registry of breakpoint records, most recently registered first.
///
/// There is no removal: records live as long as the process.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    records: Vec<BreakpointRecord>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record unless its address is already bound
    pub fn register(&mut self, record: BreakpointRecord) -> Result<(), BreakpointError> {
        self.check_free(record.address, record.handler_name)?;
        self.records.push(record);
        Ok(())
    }

    /// Fail with `Conflict` if `address` already has a record
    pub fn check_free(&self, address: usize, rejected: &'static str) -> Result<(), BreakpointError> {
        match self.lookup(address) {
            Some(existing) => Err(BreakpointError::Conflict {
                address,
                existing: existing.handler_name,
                rejected,
            }),
            None => Ok(()),
        }
    }

    /// Find the record for `address`
    pub fn lookup(&self, address: usize) -> Option<&BreakpointRecord> {
        self.iter().find(|bp| bp.address == address)
    }

    /// Records in lookup order (newest first)
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointRecord> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
