//! Fixed-layout receipt records handed across the C boundary.
//!
//! # Responsibilities
//! - Materialize a finality record into a caller-owned, heap-allocated struct
//! - Track every outstanding pointer so a double or foreign free is caught
//! - Release records exactly once
//!
//! # Design Decisions
//! - Pointers are keyed by address in a `DashMap`; an accessor holds the
//!   entry's shard guard while reading, so a concurrent free cannot tear the
//!   record out from under it
//! - A bad free is a diagnostic, never a crash: nothing is deallocated

use dashmap::DashMap;
use std::ptr::NonNull;

use crate::blockchain::types::FinalityRecord;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::registry::Handle;

/// Receipt as laid out for C callers.
///
/// Size 76, alignment 4. `handle` is the registry handle the record was
/// materialized from.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub block_height: i32,
    pub block_hash: [u8; 32],
    pub transaction_index: i32,
    pub transaction_hash: [u8; 32],
    pub handle: i32,
}

impl Receipt {
    /// Convert `record`, failing when a position does not fit an `i32`.
    pub fn from_record(handle: Handle, record: &FinalityRecord) -> Result<Self> {
        let block_height = i32::try_from(record.block_height).map_err(|_| {
            Error::Allocation(format!("block height {} exceeds i32", record.block_height))
        })?;
        let transaction_index = i32::try_from(record.transaction_index).map_err(|_| {
            Error::Allocation(format!(
                "transaction index {} exceeds i32",
                record.transaction_index
            ))
        })?;

        Ok(Self {
            block_height,
            block_hash: record.block_hash.0,
            transaction_index,
            transaction_hash: record.transaction_hash.0,
            handle: handle.raw(),
        })
    }
}

/// Registry of records currently owned by callers.
#[derive(Debug, Default)]
pub struct RecordLedger {
    outstanding: DashMap<usize, Handle>,
}

impl RecordLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a boundary record for `record`.
    pub fn materialize(&self, handle: Handle, record: &FinalityRecord) -> Result<NonNull<Receipt>> {
        let receipt = Receipt::from_record(handle, record)?;
        let ptr = NonNull::from(Box::leak(Box::new(receipt)));
        self.outstanding.insert(ptr.as_ptr() as usize, handle);
        metrics::record_outstanding_records(self.outstanding.len());

        tracing::debug!(handle = %handle, "Materialized receipt record");
        Ok(ptr)
    }

    /// Whether `ptr` is a live record from [`RecordLedger::materialize`].
    pub fn is_outstanding(&self, ptr: *const Receipt) -> bool {
        self.outstanding.contains_key(&(ptr as usize))
    }

    /// Run `f` on the record at `ptr` if it is outstanding.
    pub fn with_record<T>(&self, ptr: *const Receipt, f: impl FnOnce(&Receipt) -> T) -> Result<T> {
        if ptr.is_null() {
            return Err(Error::InvalidArgument("receipt pointer is null".to_string()));
        }
        let entry = self
            .outstanding
            .get(&(ptr as usize))
            .ok_or(Error::UnknownRecord(ptr as usize))?;
        // SAFETY: the address is tracked, so it came from `Box::leak` in
        // `materialize` and has not been freed; the guard blocks `release`.
        let value = f(unsafe { &*ptr });
        drop(entry);
        Ok(value)
    }

    /// Free the record at `ptr`.
    ///
    /// Null, foreign, and already-freed pointers are reported and left alone.
    pub fn release(&self, ptr: *mut Receipt) -> Result<()> {
        if ptr.is_null() {
            return Err(Error::InvalidArgument("receipt pointer is null".to_string()));
        }
        match self.outstanding.remove(&(ptr as usize)) {
            Some((_, handle)) => {
                // SAFETY: removal from the ledger succeeds exactly once per
                // pointer produced by `materialize`.
                drop(unsafe { Box::from_raw(ptr) });
                metrics::record_outstanding_records(self.outstanding.len());
                tracing::debug!(handle = %handle, "Released receipt record");
                Ok(())
            }
            None => {
                tracing::warn!(ptr = ptr as usize, "Refusing to free unknown or already freed receipt record");
                Err(Error::UnknownRecord(ptr as usize))
            }
        }
    }

    /// Number of records not yet freed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

impl Drop for RecordLedger {
    fn drop(&mut self) {
        for (addr, _) in std::mem::take(&mut self.outstanding) {
            // SAFETY: every tracked address is a live `Box<Receipt>`.
            drop(unsafe { Box::from_raw(addr as *mut Receipt) });
        }
    }
}
