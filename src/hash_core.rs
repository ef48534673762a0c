//! HashCore: the group array, its free list, and the overflow chains.
//!
//! Layout
//! - `groups[0..basesize]` are home groups; an entry with hash `h` lives
//!   in the chain rooted at `h % basesize`.
//! - `groups[basesize..]` start out as dedicated overflow space, but any
//!   free group (home or not) may be borrowed as overflow.
//! - A chain is circular and doubly linked through `next`/`prev`: root,
//!   overflow, ..., root. A root's `prev` is its chain's tail.
//! - Free groups form a circular doubly-linked list through `next`/`prev`.
//!   Release pushes at the head and acquisition pops the head, so a fresh
//!   table hands out its highest indices first.
//!
//! Nothing here looks at keys; the core only moves groups between the
//! free list and chains. Matching lives in `behavior`, chain walking in
//! `table`.

use crate::error::{Error, Result};
use crate::group::{Entry, Group, GroupState, GSIZE};
use tracing::debug;

/// Overflow groups per home group, as a divisor: `size = basesize + basesize / OVLFACT`.
pub(crate) const OVLFACT: usize = 1;

#[cfg(test)]
thread_local! {
    /// When set, the next `allocate` on this thread fails once.
    pub(crate) static FAIL_NEXT_ALLOCATION: core::cell::Cell<bool> =
        const { core::cell::Cell::new(false) };
}

pub(crate) struct HashCore<T> {
    basesize: usize,
    groups: Vec<Group<T>>,
    free: Option<usize>,
}

impl<T: Clone> Clone for HashCore<T> {
    fn clone(&self) -> Self {
        HashCore {
            basesize: self.basesize,
            groups: self.groups.clone(),
            free: self.free,
        }
    }
}

impl<T> HashCore<T> {
    /// Sizes the table for about `expected` entries. `basesize` is the
    /// smallest `2^k - 1` with at least `expected / GSIZE + 1` groups.
    pub fn allocate(expected: usize) -> Result<Self> {
        #[cfg(test)]
        if FAIL_NEXT_ALLOCATION.with(|f| f.replace(false)) {
            return Err(Error::AllocationFailure);
        }
        let wanted = expected / GSIZE + 1;
        let mut basesize = 1usize;
        while basesize < wanted {
            basesize = basesize
                .checked_mul(2)
                .and_then(|b| b.checked_add(1))
                .ok_or(Error::AllocationFailure)?;
        }
        let size = basesize
            .checked_add(basesize / OVLFACT)
            .ok_or(Error::AllocationFailure)?;
        let mut groups = Vec::new();
        groups.try_reserve_exact(size)?;
        groups.extend((0..size).map(Group::unknown));
        let mut core = HashCore {
            basesize,
            groups,
            free: None,
        };
        core.thread_free_list();
        Ok(core)
    }

    fn thread_free_list(&mut self) {
        self.free = None;
        for i in 0..self.groups.len() {
            self.push_free(i);
        }
    }

    #[inline]
    pub fn basesize(&self) -> usize {
        self.basesize
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn home(&self, hash: u64) -> usize {
        (hash % self.basesize as u64) as usize
    }

    #[inline]
    pub fn group(&self, i: usize) -> &Group<T> {
        &self.groups[i]
    }

    #[inline]
    pub fn group_mut(&mut self, i: usize) -> &mut Group<T> {
        &mut self.groups[i]
    }

    #[inline]
    pub fn groups(&self) -> &[Group<T>] {
        &self.groups
    }

    fn push_free(&mut self, i: usize) {
        debug_assert!(self.groups[i].is_empty());
        self.groups[i].state = GroupState::Free;
        match self.free {
            None => {
                let g = &mut self.groups[i];
                g.next = i;
                g.prev = i;
            }
            Some(head) => {
                let tail = self.groups[head].prev;
                self.groups[i].next = head;
                self.groups[i].prev = tail;
                self.groups[tail].next = i;
                self.groups[head].prev = i;
            }
        }
        self.free = Some(i);
    }

    /// Removes a specific free group from the free list in O(1).
    fn unfree(&mut self, i: usize) -> Result<()> {
        if self.groups[i].state != GroupState::Free {
            return Err(Error::InternalInvariantViolation(
                "unfree of a group that is not free",
            ));
        }
        let (next, prev) = (self.groups[i].next, self.groups[i].prev);
        if next == i {
            self.free = None;
        } else {
            self.groups[prev].next = next;
            self.groups[next].prev = prev;
            if self.free == Some(i) {
                self.free = Some(next);
            }
        }
        let g = &mut self.groups[i];
        g.state = GroupState::Unknown;
        g.next = i;
        g.prev = i;
        Ok(())
    }

    /// Pops the free-list head, or `None` when every group is in use.
    pub fn acquire_free(&mut self) -> Result<Option<usize>> {
        match self.free {
            None => Ok(None),
            Some(head) => {
                self.unfree(head)?;
                Ok(Some(head))
            }
        }
    }

    /// Returns an empty group to the free list, unlinking it from its
    /// chain first. A root may only be released once it is alone.
    pub fn release(&mut self, i: usize) -> Result<()> {
        if !self.groups[i].is_empty() {
            return Err(Error::InternalInvariantViolation(
                "release of a group that still holds entries",
            ));
        }
        match self.groups[i].state {
            GroupState::Overflow => self.unlink(i)?,
            GroupState::Root if self.groups[i].next != i => {
                return Err(Error::InternalInvariantViolation(
                    "release of a root that still has overflow groups",
                ))
            }
            GroupState::Free => {
                return Err(Error::InternalInvariantViolation("double release of a group"))
            }
            _ => {}
        }
        self.push_free(i);
        Ok(())
    }

    fn unlink(&mut self, i: usize) -> Result<()> {
        let (next, prev) = (self.groups[i].next, self.groups[i].prev);
        if self.groups[prev].next != i || self.groups[next].prev != i {
            return Err(Error::InternalInvariantViolation(
                "chain links are not symmetric",
            ));
        }
        self.groups[prev].next = next;
        self.groups[next].prev = prev;
        let g = &mut self.groups[i];
        g.next = i;
        g.prev = i;
        Ok(())
    }

    /// Makes group `i` a root. A free group is taken off the free list. A
    /// group serving as another chain's overflow is copied into a free
    /// group first. Returns `false` when that copy needs a free group and
    /// none is left, so the caller must grow and retry.
    pub fn ensure_root(&mut self, i: usize) -> Result<bool> {
        match self.groups[i].state {
            GroupState::Root => Ok(true),
            GroupState::Free => {
                self.unfree(i)?;
                let g = &mut self.groups[i];
                g.state = GroupState::Root;
                g.next = i;
                g.prev = i;
                Ok(true)
            }
            GroupState::Overflow => {
                let Some(fresh) = self.acquire_free()? else {
                    return Ok(false);
                };
                let (next, prev) = (self.groups[i].next, self.groups[i].prev);
                let buckets = self.groups[i].take_buckets();
                {
                    let f = &mut self.groups[fresh];
                    f.buckets = buckets;
                    f.next = next;
                    f.prev = prev;
                    f.state = GroupState::Overflow;
                }
                self.groups[prev].next = fresh;
                self.groups[next].prev = fresh;
                let g = &mut self.groups[i];
                g.state = GroupState::Root;
                g.next = i;
                g.prev = i;
                debug!(group = i, moved_to = fresh, "swapped overflow group out of home slot");
                Ok(true)
            }
            GroupState::Unknown => Err(Error::InternalInvariantViolation(
                "home group in unknown state",
            )),
        }
    }

    /// Links a free group at the tail of `root`'s chain in O(1). `None`
    /// when no free group is left.
    pub fn append_overflow(&mut self, root: usize) -> Result<Option<usize>> {
        let Some(fresh) = self.acquire_free()? else {
            return Ok(None);
        };
        let tail = self.groups[root].prev;
        let f = &mut self.groups[fresh];
        f.state = GroupState::Overflow;
        f.next = root;
        f.prev = tail;
        self.groups[tail].next = fresh;
        self.groups[root].prev = fresh;
        Ok(Some(fresh))
    }

    /// Group indices of the chain rooted at `root`, in chain order.
    pub fn chain(&self, root: usize) -> Chain<'_, T> {
        Chain {
            core: self,
            root,
            cur: Some(root),
            budget: self.groups.len(),
        }
    }

    /// Takes every entry out and returns all groups to the free list. The
    /// group count is unchanged.
    pub fn drain(&mut self) -> Vec<Entry<T>> {
        let mut out = Vec::new();
        for (i, g) in self.groups.iter_mut().enumerate() {
            if g.is_chained() {
                out.extend(g.take_buckets().into_iter().flatten());
            }
            *g = Group::unknown(i);
        }
        self.thread_free_list();
        out
    }

    /// Entries of chained groups in ascending group index.
    pub fn into_entries(self) -> impl Iterator<Item = Entry<T>> {
        self.groups
            .into_iter()
            .filter(Group::is_chained)
            .flat_map(|g| g.buckets.into_iter().flatten())
    }

    pub fn free_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.state == GroupState::Free)
            .count()
    }

    /// Checks chain, free-list and bucket-packing invariants.
    pub fn validate(&self, entries: usize, stores_values: bool) -> Result<()> {
        use Error::InternalInvariantViolation as Broken;
        let size = self.groups.len();

        let mut free_seen = 0usize;
        if let Some(head) = self.free {
            let mut cur = head;
            loop {
                let g = &self.groups[cur];
                if g.state != GroupState::Free {
                    return Err(Broken("free list links a group that is not free"));
                }
                if g.occupied() != 0 {
                    return Err(Broken("free group holds entries"));
                }
                if self.groups[g.next].prev != cur {
                    return Err(Broken("free list links are not symmetric"));
                }
                free_seen += 1;
                if free_seen > size {
                    return Err(Broken("free list does not cycle"));
                }
                cur = g.next;
                if cur == head {
                    break;
                }
            }
        }
        if free_seen != self.free_groups() {
            return Err(Broken("free group missing from the free list"));
        }

        let mut overflow_seen = 0usize;
        let mut occupied = 0usize;
        for root in 0..size {
            match self.groups[root].state {
                GroupState::Unknown => return Err(Broken("group left in unknown state")),
                GroupState::Root if root >= self.basesize => {
                    return Err(Broken("root outside the home region"))
                }
                GroupState::Root => {}
                _ => continue,
            }
            let mut seen_gap = false;
            let mut cur = root;
            let mut walked = 0usize;
            loop {
                let g = &self.groups[cur];
                if cur != root {
                    if g.state != GroupState::Overflow {
                        return Err(Broken("chain member is not an overflow group"));
                    }
                    overflow_seen += 1;
                }
                if g.is_empty() {
                    return Err(Broken("empty group left in a chain"));
                }
                if self.groups[g.next].prev != cur {
                    return Err(Broken("chain links are not symmetric"));
                }
                for bucket in &g.buckets {
                    match bucket {
                        None => seen_gap = true,
                        Some(e) => {
                            if seen_gap {
                                return Err(Broken("occupied bucket after an empty one"));
                            }
                            if self.home(e.hash) != root {
                                return Err(Broken("entry stored outside its home chain"));
                            }
                            if e.value.is_some() != stores_values {
                                return Err(Broken("entry shape does not match behavior"));
                            }
                            occupied += 1;
                        }
                    }
                }
                walked += 1;
                if walked > size {
                    return Err(Broken("chain does not cycle back to its root"));
                }
                cur = g.next;
                if cur == root {
                    break;
                }
            }
        }
        let overflow_total = self
            .groups
            .iter()
            .filter(|g| g.state == GroupState::Overflow)
            .count();
        if overflow_seen != overflow_total {
            return Err(Broken("overflow group outside any chain"));
        }
        if occupied != entries {
            return Err(Broken("entry count out of sync with buckets"));
        }
        Ok(())
    }
}

/// Walks one chain from its root. Stops after `size` steps even if the
/// links are corrupt.
pub(crate) struct Chain<'a, T> {
    core: &'a HashCore<T>,
    root: usize,
    cur: Option<usize>,
    budget: usize,
}

impl<T> Iterator for Chain<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let c = self.cur?;
        self.budget = self.budget.saturating_sub(1);
        let n = self.core.groups[c].next;
        self.cur = if n == self.root || self.budget == 0 {
            None
        } else {
            Some(n)
        };
        Some(c)
    }
}

/// Occupancy figures for a table.
#[cfg(feature = "stats")]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub groups: usize,
    pub basesize: usize,
    pub roots: usize,
    pub overflow_groups: usize,
    pub free_groups: usize,
    pub entries: usize,
    pub longest_chain: usize,
}

#[cfg(feature = "stats")]
impl<T> HashCore<T> {
    pub fn stats(&self) -> TableStats {
        let mut s = TableStats {
            groups: self.size(),
            basesize: self.basesize,
            ..TableStats::default()
        };
        for (i, g) in self.groups.iter().enumerate() {
            match g.state {
                GroupState::Root => {
                    s.roots += 1;
                    s.longest_chain = s.longest_chain.max(self.chain(i).count());
                }
                GroupState::Overflow => s.overflow_groups += 1,
                GroupState::Free => s.free_groups += 1,
                GroupState::Unknown => {}
            }
            s.entries += g.occupied();
        }
        s
    }
}

#[cfg(feature = "stats")]
impl<T: core::fmt::Debug> HashCore<T> {
    /// One line per group: index, state, link, bucket contents.
    pub fn layout(&self) -> String {
        use core::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "basesize={} size={} free_head={:?}",
            self.basesize,
            self.size(),
            self.free
        );
        for (i, g) in self.groups.iter().enumerate() {
            let _ = write!(
                out,
                "{i:>5} {:<8} next={:<5} prev={:<5}",
                format!("{:?}", g.state),
                g.next,
                g.prev
            );
            for b in &g.buckets {
                match b {
                    None => out.push_str(" ."),
                    Some(e) => {
                        let _ = write!(out, " [{:#x} {:?}", e.hash, e.key);
                        if let Some(v) = &e.value {
                            let _ = write!(out, " -> {v:?}");
                        }
                        out.push(']');
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: u64) -> Entry<u64> {
        Entry {
            hash,
            key: hash,
            value: None,
        }
    }

    #[test]
    fn allocation_rounds_basesize_to_two_pow_minus_one() {
        let c = HashCore::<u8>::allocate(0).unwrap();
        assert_eq!((c.basesize(), c.size()), (1, 2));
        let c = HashCore::<u8>::allocate(4).unwrap();
        assert_eq!((c.basesize(), c.size()), (3, 6));
        let c = HashCore::<u8>::allocate(100).unwrap();
        assert_eq!((c.basesize(), c.size()), (31, 62));
        c.validate(0, false).unwrap();
    }

    #[test]
    fn fresh_core_hands_out_overflow_region_first() {
        let mut c = HashCore::<u8>::allocate(8).unwrap();
        let size = c.size();
        assert_eq!(c.acquire_free().unwrap(), Some(size - 1));
        assert_eq!(c.acquire_free().unwrap(), Some(size - 2));
    }

    #[test]
    fn overflow_in_home_slot_is_swapped_out() {
        let mut c = HashCore::<u64>::allocate(4).unwrap();
        assert!(c.ensure_root(0).unwrap());
        c.group_mut(0).buckets[0] = Some(entry(0));
        // Borrow group 1 as overflow of chain 0 by emptying the free list
        // down to it.
        while c.free != Some(1) {
            let g = c.acquire_free().unwrap().unwrap();
            c.group_mut(g).state = GroupState::Unknown;
        }
        let ov = c.append_overflow(0).unwrap().unwrap();
        assert_eq!(ov, 1);
        c.group_mut(1).buckets[0] = Some(entry(3));
        // Nothing free: swap-out must ask for growth.
        assert!(!c.ensure_root(1).unwrap());
        // Hand back a spare so the swap can proceed.
        c.group_mut(5).state = GroupState::Free;
        c.push_free(5);
        assert!(c.ensure_root(1).unwrap());
        assert_eq!(c.group(1).state, GroupState::Root);
        assert!(c.group(1).is_empty());
        assert_eq!(c.chain(0).collect::<Vec<_>>(), vec![0, 5]);
        assert_eq!(c.group(0).prev, 5);
        assert_eq!(c.group(5).prev, 0);
        assert_eq!(c.group(5).buckets[0].as_ref().map(|e| e.hash), Some(3));
    }

    // Test: overflow appends and releases keep the chain doubly linked.
    // Assumes: a root's `prev` names its tail.
    // Verifies: each append lands after the current tail, the root's
    // `prev` follows it, and releasing a middle group splices it out.
    #[test]
    fn overflow_appends_at_tail_through_root_prev() {
        let mut c = HashCore::<u64>::allocate(16).unwrap();
        let basesize = c.basesize() as u64;
        assert!(c.ensure_root(1).unwrap());
        let mut next_hash = 1u64;
        let mut fill = |c: &mut HashCore<u64>, g: usize| {
            for b in 0..GSIZE {
                c.group_mut(g).buckets[b] = Some(entry(next_hash));
                next_hash += basesize;
            }
        };
        fill(&mut c, 1);
        let mut order = vec![1];
        for _ in 0..3 {
            let ov = c.append_overflow(1).unwrap().unwrap();
            fill(&mut c, ov);
            order.push(ov);
            assert_eq!(c.group(1).prev, ov);
            assert_eq!(c.chain(1).collect::<Vec<_>>(), order);
        }
        c.validate(4 * GSIZE, false).unwrap();

        let middle = order.remove(2);
        drop(c.group_mut(middle).take_buckets());
        c.release(middle).unwrap();
        assert_eq!(c.chain(1).collect::<Vec<_>>(), order);
        assert_eq!(c.group(order[2]).prev, order[1]);
        c.validate(3 * GSIZE, false).unwrap();
    }

    #[test]
    fn release_rejects_occupied_and_double_free() {
        let mut c = HashCore::<u64>::allocate(0).unwrap();
        assert!(c.ensure_root(0).unwrap());
        c.group_mut(0).buckets[0] = Some(entry(0));
        assert!(c.release(0).is_err());
        drop(c.group_mut(0).take_buckets());
        c.release(0).unwrap();
        assert!(c.release(0).is_err());
        c.validate(0, false).unwrap();
    }

    #[test]
    fn drain_returns_everything_to_the_free_list() {
        let mut c = HashCore::<u64>::allocate(4).unwrap();
        assert!(c.ensure_root(2).unwrap());
        for (b, h) in [2u64, 5, 8, 11].into_iter().enumerate() {
            c.group_mut(2).buckets[b] = Some(entry(h));
        }
        let ov = c.append_overflow(2).unwrap().unwrap();
        c.group_mut(ov).buckets[0] = Some(entry(14));
        c.validate(5, false).unwrap();
        assert_eq!(c.drain().len(), 5);
        assert_eq!(c.free_groups(), c.size());
        c.validate(0, false).unwrap();
    }
}
