//! Generation-tagged slot arena.
//!
//! A handle packs a slot index (low 20 bits) and the slot's generation
//! (next 11 bits) into a non-negative `i32`. Releasing a slot bumps its
//! generation, so a stale handle never resolves to the slot's next occupant.
//! A slot whose generation would overflow is retired instead of reused.

use std::fmt;

pub const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Largest generation a slot may carry before it is retired.
pub const MAX_GENERATION: u32 = (1 << (31 - INDEX_BITS)) - 1;

/// Number of addressable slots.
pub const MAX_SLOTS: usize = 1 << INDEX_BITS;

/// Opaque handle issued by an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i32);

impl Handle {
    fn new(index: u32, generation: u32) -> Self {
        debug_assert!(index <= INDEX_MASK && generation <= MAX_GENERATION);
        Self(((generation << INDEX_BITS) | index) as i32)
    }

    /// Wrap a raw value received across the boundary. Validity is checked on use.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn index(self) -> u32 {
        (self.0 as u32) & INDEX_MASK
    }

    pub fn generation(self) -> u32 {
        (self.0 as u32) >> INDEX_BITS
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Handle> for i32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Growable table of generation-tagged slots.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    capacity: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::with_capacity_limit(MAX_SLOTS)
    }

    /// Arena that refuses to grow past `capacity` slots.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            capacity: capacity.min(MAX_SLOTS),
        }
    }

    /// Store `value` under a fresh handle. `None` when every slot is taken.
    pub fn insert(&mut self, value: T) -> Option<Handle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.live += 1;
            return Some(Handle::new(index, slot.generation));
        }

        if self.slots.len() >= self.capacity {
            return None;
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.live += 1;
        Some(Handle::new(index, 0))
    }

    fn position(&self, handle: Handle) -> Option<usize> {
        if handle.raw() < 0 {
            return None;
        }
        let index = handle.index() as usize;
        let slot = self.slots.get(index)?;
        (slot.generation == handle.generation() && slot.value.is_some()).then_some(index)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let index = self.position(handle)?;
        self.slots[index].value.as_ref()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.position(handle).is_some()
    }

    /// Remove and return the value under `handle`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = self.position(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take();
        self.live -= 1;

        if slot.generation < MAX_GENERATION {
            slot.generation += 1;
            self.free.push(index as u32);
        }
        value
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a").unwrap();
        let b = arena.insert("b").unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena = Arena::new();
        let first = arena.insert(1).unwrap();
        arena.remove(first);

        let second = arena.insert(2).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert_eq!(second.generation(), 1);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&2));
    }

    #[test]
    fn test_negative_and_unknown_handles() {
        let mut arena = Arena::new();
        arena.insert(()).unwrap();
        assert!(!arena.contains(Handle::from_raw(-1)));
        assert!(!arena.contains(Handle::from_raw(42)));
        assert!(!arena.contains(Handle::from_raw(1 << INDEX_BITS)));
    }

    #[test]
    fn test_capacity_limit() {
        let mut arena = Arena::with_capacity_limit(2);
        let a = arena.insert(0).unwrap();
        arena.insert(1).unwrap();
        assert!(arena.insert(2).is_none());

        arena.remove(a);
        assert!(arena.insert(3).is_some());
    }

    #[test]
    fn test_exhausted_slot_is_retired() {
        let mut arena = Arena::with_capacity_limit(1);
        for _ in 0..MAX_GENERATION {
            let h = arena.insert(0u8).unwrap();
            arena.remove(h);
        }
        let last = arena.insert(0u8).unwrap();
        assert_eq!(last.generation(), MAX_GENERATION);
        arena.remove(last);

        // The only slot is retired, so the arena is now full.
        assert!(arena.insert(0u8).is_none());
    }

    #[test]
    fn test_handles_are_non_negative() {
        let mut arena = Arena::with_capacity_limit(1);
        for _ in 0..=MAX_GENERATION {
            let h = arena.insert(()).unwrap();
            assert!(h.raw() >= 0);
            arena.remove(h);
        }
    }
}
