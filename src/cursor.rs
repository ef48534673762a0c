//! Cursors over a table.
//!
//! `Scan` visits every entry in group-index order. `KeyScan` walks the
//! one chain that can hold a key and yields the entries stored under it.
//! Both keep their position between steps and borrow the table shared,
//! so any number may be open over the same table while it cannot change.

use crate::behavior::{Behavior, Probe};
use crate::group::{Entry, Group, GroupState, GSIZE};
use crate::reentrancy::TableGuard;

pub(crate) struct Scan<'a, T> {
    groups: &'a [Group<T>],
    group: usize,
    bucket: usize,
    remaining: usize,
}

impl<'a, T> Scan<'a, T> {
    pub(crate) fn new(groups: &'a [Group<T>], entries: usize) -> Self {
        Scan {
            groups,
            group: 0,
            bucket: 0,
            remaining: entries,
        }
    }
}

impl<'a, T> Iterator for Scan<'a, T> {
    type Item = &'a Entry<T>;

    fn next(&mut self) -> Option<&'a Entry<T>> {
        let groups = self.groups;
        while let Some(g) = groups.get(self.group) {
            if g.is_chained() && self.bucket < GSIZE {
                if let Some(e) = &g.buckets[self.bucket] {
                    self.bucket += 1;
                    self.remaining = self.remaining.saturating_sub(1);
                    return Some(e);
                }
            }
            // Buckets are packed, so the first empty one ends the group.
            self.group += 1;
            self.bucket = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Scan<'_, T> {}

pub(crate) struct KeyScan<'a, T> {
    groups: &'a [Group<T>],
    guard: &'a TableGuard,
    behavior: Behavior,
    hash: u64,
    key: &'a T,
    root: usize,
    group: Option<usize>,
    bucket: usize,
}

impl<'a, T> KeyScan<'a, T> {
    pub(crate) fn new(
        groups: &'a [Group<T>],
        guard: &'a TableGuard,
        behavior: Behavior,
        root: usize,
        hash: u64,
        key: &'a T,
    ) -> Self {
        // An unrooted home slot holds nothing for this key.
        let group = (groups[root].state == GroupState::Root).then_some(root);
        KeyScan {
            groups,
            guard,
            behavior,
            hash,
            key,
            root,
            group,
            bucket: 0,
        }
    }
}

impl<'a, T: Eq> Iterator for KeyScan<'a, T> {
    type Item = &'a Entry<T>;

    fn next(&mut self) -> Option<&'a Entry<T>> {
        let _g = self.guard.enter();
        let probe = Probe {
            hash: self.hash,
            key: self.key,
            value: None,
        };
        let groups = self.groups;
        while let Some(gi) = self.group {
            let g = &groups[gi];
            while self.bucket < GSIZE {
                let Some(e) = &g.buckets[self.bucket] else {
                    self.group = None;
                    return None;
                };
                self.bucket += 1;
                if self.behavior.matches(e, &probe) {
                    return Some(e);
                }
            }
            self.bucket = 0;
            self.group = (g.next != self.root).then_some(g.next);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;

    fn set_entry(hash: u64, key: u32) -> Option<Entry<u32>> {
        Some(Entry {
            hash,
            key,
            value: None,
        })
    }

    fn rooted(i: usize, next: usize) -> Group<u32> {
        let mut g = Group::unknown(i);
        g.state = GroupState::Root;
        g.next = next;
        g
    }

    #[test]
    fn scan_skips_unchained_groups_and_stops_at_gaps() {
        let mut groups = vec![rooted(0, 0), Group::unknown(1), rooted(2, 2)];
        groups[1].state = GroupState::Free;
        groups[0].buckets[0] = set_entry(0, 1);
        groups[0].buckets[1] = set_entry(0, 2);
        groups[2].buckets[0] = set_entry(2, 3);
        let keys: Vec<u32> = Scan::new(&groups, 3).map(|e| e.key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn key_scan_follows_chain_and_resumes() {
        let guard = TableGuard::new();
        let mut groups = vec![rooted(0, 1), Group::unknown(1)];
        groups[1].state = GroupState::Overflow;
        groups[1].next = 0;
        for b in 0..GSIZE {
            groups[0].buckets[b] = Some(Entry {
                hash: 4,
                key: if b % 2 == 0 { 7 } else { 8 },
                value: Some(b as u32),
            });
        }
        groups[1].buckets[0] = Some(Entry {
            hash: 4,
            key: 7,
            value: Some(40),
        });
        let vals: Vec<u32> = KeyScan::new(&groups, &guard, Behavior::Graph, 0, 4, &7)
            .map(|e| *e.value())
            .collect();
        assert_eq!(vals, vec![0, 2, 40]);
    }

    #[test]
    fn key_scan_on_unrooted_slot_is_empty() {
        let guard = TableGuard::new();
        let mut groups = vec![Group::unknown(0)];
        groups[0].state = GroupState::Free;
        assert_eq!(KeyScan::new(&groups, &guard, Behavior::Set, 0, 0, &1u32).count(), 0);
    }
}
