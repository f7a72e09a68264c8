//! Striped locks serializing multi-store sequences per `(name, owner)`.

use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

const STRIPES: usize = 64;

pub(crate) struct NameLocks {
    stripes: Box<[Mutex<()>]>,
    hasher: RandomState,
}

impl NameLocks {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn stripe(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) as usize) % self.stripes.len()
    }

    pub(crate) fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)].lock()
    }

    /// Lock the stripes of all `keys`, in ascending stripe order
    pub(crate) fn lock_many<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> Vec<MutexGuard<'_, ()>> {
        let mut stripes: Vec<usize> = keys.into_iter().map(|k| self.stripe(k)).collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes.into_iter().map(|i| self.stripes[i].lock()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_stripe() {
        let locks = NameLocks::new();
        assert_eq!(locks.stripe("u1\0a.txt"), locks.stripe("u1\0a.txt"));
        let guard = locks.lock("u1\0a.txt");
        assert!(locks.stripes[locks.stripe("u1\0a.txt")].try_lock().is_none());
        drop(guard);
    }

    #[test]
    fn test_lock_many_dedups() {
        let locks = NameLocks::new();
        let guards = locks.lock_many(["a", "a", "b"]);
        assert!(guards.len() <= 2);
        assert!(!guards.is_empty());
    }
}
