//! Per-account nonce allocation.
//!
//! Nonces belong to an account, not to a signer object: any number of
//! handles may be derived from one seed, and all of them draw from the same
//! counter here.

use alloy::primitives::Address;
use dashmap::DashMap;

/// Next nonce to hand out, keyed by sender address.
#[derive(Debug, Default)]
pub struct NonceBook {
    next: DashMap<Address, u64>,
}

impl NonceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce for `account`.
    ///
    /// The counter is first raised to `chain_nonce`, never lowered, so
    /// transactions still in flight keep their nonces. Sync and increment
    /// happen under one entry lock.
    pub fn reserve(&self, account: Address, chain_nonce: u64) -> u64 {
        let mut next = self.next.entry(account).or_insert(0);
        *next = (*next).max(chain_nonce);
        let nonce = *next;
        *next += 1;
        nonce
    }

    /// Hand back `nonce` if it is still the latest one issued for `account`.
    ///
    /// Only for outcomes where the transaction definitely never reached a pool.
    pub fn release(&self, account: Address, nonce: u64) -> bool {
        match self.next.get_mut(&account) {
            Some(mut next) if *next == nonce + 1 => {
                *next = nonce;
                true
            }
            _ => false,
        }
    }

    /// The nonce `reserve` would hand out next, ignoring the chain.
    pub fn peek(&self, account: Address) -> Option<u64> {
        self.next.get(&account).map(|next| *next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);

    #[test]
    fn test_reserve_and_sync() {
        let book = NonceBook::new();

        assert_eq!(book.reserve(ALICE, 0), 0);
        assert_eq!(book.reserve(ALICE, 0), 1);
        assert_eq!(book.peek(ALICE), Some(2));

        // A stale pool view never lowers the counter
        assert_eq!(book.reserve(ALICE, 1), 2);
        assert_eq!(book.reserve(ALICE, 10), 10);
        assert_eq!(book.peek(ALICE), Some(11));
    }

    #[test]
    fn test_accounts_are_independent() {
        let book = NonceBook::new();
        assert_eq!(book.reserve(ALICE, 5), 5);
        assert_eq!(book.reserve(BOB, 0), 0);
        assert_eq!(book.peek(ALICE), Some(6));
        assert_eq!(book.peek(BOB), Some(1));
    }

    #[test]
    fn test_release_only_latest() {
        let book = NonceBook::new();
        let first = book.reserve(ALICE, 0);
        let second = book.reserve(ALICE, 0);

        assert!(!book.release(ALICE, first));
        assert!(book.release(ALICE, second));
        assert_eq!(book.peek(ALICE), Some(1));
        assert!(!book.release(BOB, 0));
    }

    #[test]
    fn test_concurrent_reservations_are_unique() {
        let book = Arc::new(NonceBook::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let book = book.clone();
                thread::spawn(move || (0..100).map(|_| book.reserve(ALICE, 0)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for nonce in t.join().unwrap() {
                assert!(seen.insert(nonce), "nonce {} issued twice", nonce);
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(book.peek(ALICE), Some(800));
    }
}
