//! RawTable: forced/unforced matching, deletion with backfill, resizing.
//!
//! Layers
//! - `Table` owns the `HashCore` and the counters and implements the
//!   chain algorithms. It never enters the guard.
//! - `RawTable` wraps it with the debug reentrancy guard: every public
//!   entry point enters once, and element `Drop`s caused by a removal run
//!   only after the guard is released and the chain is consistent again.
//!
//! Hashes are computed once, with the table's `BuildHasher`, and stored
//! in the entry. Resizing and copying between tables reuse the stored
//! hash and never call `Element::element_hash` again.

use crate::behavior::{Behavior, Forced, Probe};
use crate::cursor::{KeyScan, Scan};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::group::{Entry, GroupState, GSIZE};
use crate::hash_core::HashCore;
use crate::reentrancy::TableGuard;
use core::hash::BuildHasher;
use tracing::{debug, trace};

/// Shrink only tables with more groups than this.
pub(crate) const RESIZE_THRESHOLD: usize = 16;
/// Shrink when `entries * RESIZE_FACTOR < groups * GSIZE`.
pub(crate) const RESIZE_FACTOR: usize = 8;

/// Outcome of a forced insert.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Placed {
    New,
    Present,
    Overwritten { changed: bool },
}

impl Placed {
    pub fn is_new(self) -> bool {
        self == Placed::New
    }
}

#[derive(Clone)]
struct Table<T, S> {
    core: HashCore<T>,
    behavior: Behavior,
    entries: usize,
    dirty: bool,
    hasher: S,
}

impl<T: Element, S: BuildHasher> Table<T, S> {
    fn find(&self, hash: u64, key: &T, value: Option<&T>) -> Option<&Entry<T>> {
        let root = self.core.home(hash);
        if self.core.group(root).state != GroupState::Root {
            return None;
        }
        let probe = Probe { hash, key, value };
        for gi in self.core.chain(root) {
            for bucket in &self.core.group(gi).buckets {
                match bucket {
                    None => return None,
                    Some(e) if self.behavior.matches(e, &probe) => return Some(e),
                    Some(_) => {}
                }
            }
        }
        None
    }

    fn place(&mut self, hash: u64, key: T, value: Option<T>) -> Result<Placed> {
        let behavior = self.behavior;
        let mut pending = Entry { hash, key, value };
        loop {
            let root = self.core.home(hash);
            if !self.core.ensure_root(root)? {
                self.grow()?;
                continue;
            }
            let mut gi = root;
            loop {
                for b in 0..GSIZE {
                    let bucket = &mut self.core.group_mut(gi).buckets[b];
                    match behavior.force(bucket, pending) {
                        Forced::Rejected(back) => pending = back,
                        Forced::Inserted => {
                            self.entries += 1;
                            return Ok(Placed::New);
                        }
                        Forced::Present => return Ok(Placed::Present),
                        Forced::Overwritten { changed } => {
                            if changed {
                                self.dirty = true;
                            }
                            return Ok(Placed::Overwritten { changed });
                        }
                    }
                }
                let next = self.core.group(gi).next;
                if next == root {
                    break;
                }
                gi = next;
            }
            match self.core.append_overflow(root)? {
                Some(fresh) => {
                    self.core.group_mut(fresh).buckets[0] = Some(pending);
                    self.entries += 1;
                    return Ok(Placed::New);
                }
                None => self.grow()?,
            }
        }
    }

    fn grow(&mut self) -> Result<()> {
        let expected = self
            .core
            .basesize()
            .saturating_mul(GSIZE)
            .saturating_add(1);
        self.resize(expected)
    }

    /// Rebuilds into a fresh core sized for `expected` entries. The new
    /// core is allocated before anything moves, so allocation failure
    /// leaves the table as it was.
    fn resize(&mut self, expected: usize) -> Result<()> {
        let fresh = HashCore::allocate(expected)?;
        let from = self.core.size();
        let old = core::mem::replace(&mut self.core, fresh);
        let count = self.entries;
        let dirty = self.dirty;
        self.entries = 0;
        for e in old.into_entries() {
            self.place(e.hash, e.key, e.value)?;
        }
        self.dirty = dirty;
        debug!(
            from_groups = from,
            to_groups = self.core.size(),
            entries = count,
            "table resized"
        );
        if self.entries != count {
            return Err(Error::InternalInvariantViolation(
                "resize changed the entry count",
            ));
        }
        Ok(())
    }

    /// Removes every entry matching the probe from its chain, then packs
    /// the chain and frees groups left empty. Returns the removed entries
    /// so the caller can drop them outside the guard.
    fn remove(&mut self, hash: u64, key: &T, value: Option<&T>) -> Result<Vec<Entry<T>>> {
        let root = self.core.home(hash);
        if self.core.group(root).state != GroupState::Root {
            return Err(Error::KeyNotFound);
        }
        let behavior = self.behavior;
        let chain: Vec<usize> = self.core.chain(root).collect();
        let probe = Probe { hash, key, value };
        let mut released = Vec::new();
        for &gi in &chain {
            for bucket in self.core.group_mut(gi).buckets.iter_mut() {
                if bucket.as_ref().is_some_and(|e| behavior.matches(e, &probe)) {
                    released.extend(bucket.take());
                }
            }
        }
        if released.is_empty() {
            return Err(Error::KeyNotFound);
        }
        self.entries -= released.len();
        self.dirty = true;
        self.backfill(&chain);
        for &gi in &chain[1..] {
            if self.core.group(gi).is_empty() {
                self.core.release(gi)?;
            }
        }
        if self.core.group(root).is_empty() {
            self.core.release(root)?;
        }
        self.shrink_if_sparse()?;
        Ok(released)
    }

    /// Shrinks a sparse table. Runs after a delete has already committed,
    /// so a failed allocation keeps the larger table, which is still valid.
    fn shrink_if_sparse(&mut self) -> Result<()> {
        if self.core.size() <= RESIZE_THRESHOLD
            || self.entries * RESIZE_FACTOR >= self.core.size() * GSIZE
        {
            return Ok(());
        }
        match self.resize(self.entries) {
            Err(Error::AllocationFailure) => {
                debug!(
                    groups = self.core.size(),
                    entries = self.entries,
                    "shrink skipped, allocation failed"
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Slides surviving entries of a chain toward its root so only the
    /// tail group can have empty buckets.
    fn backfill(&mut self, chain: &[usize]) {
        let mut write = 0usize;
        let mut moved = 0usize;
        for read in 0..chain.len() * GSIZE {
            let src = &mut self.core.group_mut(chain[read / GSIZE]).buckets[read % GSIZE];
            let Some(e) = src.take() else {
                continue;
            };
            if read != write {
                moved += 1;
            }
            self.core.group_mut(chain[write / GSIZE]).buckets[write % GSIZE] = Some(e);
            write += 1;
        }
        trace!(chain_groups = chain.len(), moved, "backfilled chain after delete");
    }
}

/// The shared engine behind every relation.
#[derive(Clone)]
pub(crate) struct RawTable<T, S> {
    table: Table<T, S>,
    guard: TableGuard,
}

impl<T: Element, S: BuildHasher> RawTable<T, S> {
    pub fn new(behavior: Behavior, expected: usize, hasher: S) -> Result<Self> {
        Ok(RawTable {
            table: Table {
                core: HashCore::allocate(expected)?,
                behavior,
                entries: 0,
                dirty: false,
                hasher,
            },
            guard: TableGuard::new(),
        })
    }

    #[inline]
    pub fn behavior(&self) -> Behavior {
        self.table.behavior
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.entries == 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.table.dirty
    }

    #[inline]
    pub fn set_dirty(&mut self, dirty: bool) {
        self.table.dirty = dirty;
    }

    #[inline]
    pub fn hasher(&self) -> &S {
        &self.table.hasher
    }

    /// Total bucket count.
    pub fn capacity(&self) -> usize {
        self.table.core.size() * GSIZE
    }

    #[cfg(test)]
    pub fn group_count(&self) -> usize {
        self.table.core.size()
    }

    pub fn hash_of(&self, x: &T) -> Result<u64> {
        Ok(x.element_hash(&self.table.hasher)?)
    }

    pub fn iter(&self) -> Scan<'_, T> {
        Scan::new(self.table.core.groups(), self.table.entries)
    }

    /// Entries stored under `key`, whose hash is `hash`.
    pub fn key_scan<'a>(&'a self, hash: u64, key: &'a T) -> KeyScan<'a, T> {
        KeyScan::new(
            self.table.core.groups(),
            &self.guard,
            self.table.behavior,
            self.table.core.home(hash),
            hash,
            key,
        )
    }

    /// Unforced lookup. `value == None` matches any value under the key;
    /// Sets ignore `value`.
    pub fn find(&self, hash: u64, key: &T, value: Option<&T>) -> Option<&Entry<T>> {
        let _g = self.guard.enter();
        self.table.find(hash, key, value)
    }

    pub fn find_key(&self, key: &T) -> Result<Option<&Entry<T>>> {
        let hash = self.hash_of(key)?;
        Ok(self.find(hash, key, None))
    }

    /// Forced insert with a precomputed hash. Sets drop `value`; Dicts and
    /// Graphs require one.
    pub fn insert_hashed(&mut self, hash: u64, key: T, value: Option<T>) -> Result<Placed> {
        let value = match (self.table.behavior.stores_values(), value) {
            (false, _) => None,
            (true, Some(v)) => Some(v),
            (true, None) => {
                return Err(Error::InvalidArgument(
                    "Dict and Graph entries need a value",
                ))
            }
        };
        let _g = self.guard.enter();
        self.table.place(hash, key, value)
    }

    pub fn insert(&mut self, key: T, value: Option<T>) -> Result<Placed> {
        let hash = self.hash_of(&key)?;
        self.insert_hashed(hash, key, value)
    }

    /// Copies an entry from another table, reusing its stored hash. A Set
    /// entry entering a Dict/Graph maps the member to itself.
    pub fn insert_entry(&mut self, e: &Entry<T>) -> Result<Placed> {
        let value = self
            .table
            .behavior
            .stores_values()
            .then(|| e.value().clone());
        self.insert_hashed(e.hash, e.key.clone(), value)
    }

    /// Deletes every entry matching `key` (and `value` when given).
    /// Returns how many were removed, or `KeyNotFound` if none matched.
    pub fn remove(&mut self, key: &T, value: Option<&T>) -> Result<usize> {
        let hash = self.hash_of(key)?;
        let released = {
            let _g = self.guard.enter();
            self.table.remove(hash, key, value)?
        };
        Ok(released.len())
    }

    /// Drops every entry. Group count and the dirty flag are kept.
    pub fn clear(&mut self) {
        let old = {
            let _g = self.guard.enter();
            self.table.entries = 0;
            self.table.core.drain()
        };
        drop(old);
    }

    pub fn resize(&mut self, expected: usize) -> Result<()> {
        let _g = self.guard.enter();
        self.table.resize(expected)
    }

    pub fn validate(&self) -> Result<()> {
        let _g = self.guard.enter();
        self.table
            .core
            .validate(self.table.entries, self.table.behavior.stores_values())
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> crate::hash_core::TableStats {
        self.table.core.stats()
    }

    #[cfg(feature = "stats")]
    pub fn layout(&self) -> String
    where
        T: core::fmt::Debug,
    {
        self.table.core.layout()
    }
}
