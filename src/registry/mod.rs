//! Process-wide handle registry.
//!
//! # Responsibilities
//! - Map opaque integer handles to live native objects of several kinds
//! - Reject unknown, stale, and wrong-kind handles with `InvalidHandle`
//! - Keep register/resolve/release atomic with respect to each other
//!
//! # Design Decisions
//! - Objects are stored as `Arc`s: a resolve hands out a clone, so a release
//!   racing an in-flight operation never tears down an object in use
//! - One `RwLock` around the whole table; resolves share the read side

pub mod arena;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::blockchain::submission::Submission;
use crate::blockchain::types::FinalityRecord;
use crate::blockchain::wallet::Signer;
use crate::error::{Error, Result};
use crate::observability::metrics;

pub use arena::{Arena, Handle};

/// Kinds of object the registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Signer,
    Submission,
    Receipt,
}

impl ObjectKind {
    fn slot(self) -> usize {
        match self {
            ObjectKind::Signer => 0,
            ObjectKind::Submission => 1,
            ObjectKind::Receipt => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Signer => "signer",
            ObjectKind::Submission => "submission",
            ObjectKind::Receipt => "receipt",
        }
    }
}

/// A registry-managed object.
#[derive(Debug, Clone)]
pub enum Object {
    Signer(Arc<Signer>),
    Submission(Arc<Submission>),
    Receipt(Arc<FinalityRecord>),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Signer(_) => ObjectKind::Signer,
            Object::Submission(_) => ObjectKind::Submission,
            Object::Receipt(_) => ObjectKind::Receipt,
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    arena: Arena<Object>,
    counts: [usize; 3],
}

/// Thread-safe handle table.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    table: RwLock<Table>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry limited to `capacity` live objects.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            table: RwLock::new(Table {
                arena: Arena::with_capacity_limit(capacity),
                counts: [0; 3],
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `object` under a fresh handle.
    pub fn register(&self, object: Object) -> Result<Handle> {
        let kind = object.kind();
        let mut table = self.write();
        let handle = table.arena.insert(object).ok_or(Error::RegistryFull)?;
        table.counts[kind.slot()] += 1;
        metrics::record_live_handles(kind.as_str(), table.counts[kind.slot()]);

        tracing::debug!(handle = %handle, kind = kind.as_str(), "Registered object");
        Ok(handle)
    }

    /// Look up the object stored under `handle`.
    pub fn resolve(&self, handle: Handle) -> Result<Object> {
        self.read()
            .arena
            .get(handle)
            .cloned()
            .ok_or(Error::InvalidHandle(handle.raw()))
    }

    /// Remove the object stored under `handle`, whatever its kind.
    pub fn release(&self, handle: Handle) -> Result<Object> {
        let mut table = self.write();
        let object = table
            .arena
            .remove(handle)
            .ok_or(Error::InvalidHandle(handle.raw()))?;
        let kind = object.kind();
        table.counts[kind.slot()] -= 1;
        metrics::record_live_handles(kind.as_str(), table.counts[kind.slot()]);

        tracing::debug!(handle = %handle, kind = kind.as_str(), "Released object");
        Ok(object)
    }

    /// Remove the object under `handle` only if it is of `kind`.
    pub fn release_kind(&self, handle: Handle, kind: ObjectKind) -> Result<Object> {
        let mut table = self.write();
        match table.arena.get(handle) {
            Some(object) if object.kind() == kind => {}
            _ => return Err(Error::InvalidHandle(handle.raw())),
        }
        let object = table
            .arena
            .remove(handle)
            .ok_or(Error::InvalidHandle(handle.raw()))?;
        table.counts[kind.slot()] -= 1;
        metrics::record_live_handles(kind.as_str(), table.counts[kind.slot()]);

        tracing::debug!(handle = %handle, kind = kind.as_str(), "Released object");
        Ok(object)
    }

    pub fn signer(&self, handle: Handle) -> Result<Arc<Signer>> {
        match self.resolve(handle)? {
            Object::Signer(signer) => Ok(signer),
            _ => Err(Error::InvalidHandle(handle.raw())),
        }
    }

    pub fn submission(&self, handle: Handle) -> Result<Arc<Submission>> {
        match self.resolve(handle)? {
            Object::Submission(submission) => Ok(submission),
            _ => Err(Error::InvalidHandle(handle.raw())),
        }
    }

    pub fn receipt(&self, handle: Handle) -> Result<Arc<FinalityRecord>> {
        match self.resolve(handle)? {
            Object::Receipt(receipt) => Ok(receipt),
            _ => Err(Error::InvalidHandle(handle.raw())),
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.read().arena.contains(handle)
    }

    /// Total live objects.
    pub fn len(&self) -> usize {
        self.read().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live objects of one kind.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.read().counts[kind.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn receipt(height: u64) -> Object {
        Object::Receipt(Arc::new(FinalityRecord {
            block_height: height,
            block_hash: B256::repeat_byte(1),
            transaction_index: 0,
            transaction_hash: B256::repeat_byte(2),
        }))
    }

    #[test]
    fn test_register_resolve_release() {
        let registry = HandleRegistry::new();
        let handle = registry.register(receipt(7)).unwrap();

        assert_eq!(registry.receipt(handle).unwrap().block_height, 7);
        assert_eq!(registry.count(ObjectKind::Receipt), 1);

        registry.release(handle).unwrap();
        assert_eq!(registry.receipt(handle).unwrap_err(), Error::InvalidHandle(handle.raw()));
        assert!(registry.release(handle).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_wrong_kind_is_invalid() {
        let registry = HandleRegistry::new();
        let handle = registry.register(receipt(1)).unwrap();

        assert!(matches!(registry.signer(handle), Err(Error::InvalidHandle(_))));
        assert!(matches!(registry.submission(handle), Err(Error::InvalidHandle(_))));
        assert!(registry.release_kind(handle, ObjectKind::Signer).is_err());
        // The failed kind-checked release left the receipt in place.
        assert!(registry.contains(handle));
        assert!(registry.release_kind(handle, ObjectKind::Receipt).is_ok());
    }

    #[test]
    fn test_never_issued_handles() {
        let registry = HandleRegistry::new();
        registry.register(receipt(1)).unwrap();

        for raw in [-1, -100, 5, 1 << 20, i32::MAX] {
            let handle = Handle::from_raw(raw);
            assert_eq!(registry.resolve(handle).unwrap_err(), Error::InvalidHandle(raw));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_full() {
        let registry = HandleRegistry::with_capacity_limit(1);
        registry.register(receipt(1)).unwrap();
        assert_eq!(registry.register(receipt(2)).unwrap_err(), Error::RegistryFull);
    }

    #[test]
    fn test_concurrent_register_and_release() {
        let registry = Arc::new(HandleRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let handle = registry.register(receipt(t * 1000 + i)).unwrap();
                        assert_eq!(registry.receipt(handle).unwrap().block_height, t * 1000 + i);
                        registry.release(handle).unwrap();
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
