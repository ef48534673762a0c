//! Relation: the public Set/Dict/Graph container.

use crate::algebra;
use crate::behavior::Behavior;
use crate::cursor::{KeyScan, Scan};
use crate::element::Element;
use crate::error::{Error, Result, Unhashable};
use crate::table::RawTable;
use crate::{DefaultHashState, StableHashState};
use core::cell::Cell;
use core::cmp::Ordering;
use core::fmt;
use core::hash::BuildHasher;

/// Seed multiplier for the structural hash.
const STRUCTURAL_SEED: u64 = 121_345;
/// Weight of a value's hash in its entry's contribution.
const VALUE_WEIGHT: u64 = 23;

/// A Set, Dict or Graph over elements of type `T`.
///
/// All three share one table engine; [`Behavior`] decides what a lookup
/// matches and whether an insert adds, overwrites or is a no-op.
///
/// - Set: members only. The value of a member is the member.
/// - Dict: one value per key; inserting an existing key replaces its
///   value and marks the relation dirty when the value changed.
/// - Graph: any number of distinct values per key.
///
/// Deleting also marks a relation dirty, and derived relations inherit
/// dirtiness from their inputs.
///
/// Once [`structural_hash`](Self::structural_hash) has been computed
/// (directly, or by using the relation as an element of another one) the
/// relation is frozen and every mutator returns
/// [`Error::ImmutableViolation`].
///
/// The hash state `S` is restricted to [`StableHashState`]: binary
/// operations probe one relation with hashes stored by the other.
pub struct Relation<T, S = DefaultHashState> {
    table: RawTable<T, S>,
    memo: Cell<Option<u64>>,
}

impl<T, S> Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
    fn from_table(table: RawTable<T, S>) -> Self {
        Relation {
            table,
            memo: Cell::new(None),
        }
    }

    /// Empty relation sized for about `expected` entries.
    pub fn with_capacity(behavior: Behavior, expected: usize) -> Result<Self> {
        Self::with_capacity_and_hasher(behavior, expected, S::default())
    }

    pub fn with_capacity_and_hasher(behavior: Behavior, expected: usize, hasher: S) -> Result<Self> {
        Ok(Self::from_table(RawTable::new(behavior, expected, hasher)?))
    }

    pub fn set() -> Result<Self> {
        Self::with_capacity(Behavior::Set, 0)
    }

    pub fn dict() -> Result<Self> {
        Self::with_capacity(Behavior::Dict, 0)
    }

    pub fn graph() -> Result<Self> {
        Self::with_capacity(Behavior::Graph, 0)
    }

    pub fn from_members<I: IntoIterator<Item = T>>(members: I) -> Result<Self> {
        let it = members.into_iter();
        let mut s = Self::with_capacity(Behavior::Set, it.size_hint().0)?;
        for m in it {
            s.table.insert(m, None)?;
        }
        Ok(s)
    }

    /// Relation built from `(key, value)` pairs. A Set keeps the keys.
    pub fn from_pairs<I: IntoIterator<Item = (T, T)>>(behavior: Behavior, pairs: I) -> Result<Self> {
        let it = pairs.into_iter();
        let mut r = Self::with_capacity(behavior, it.size_hint().0)?;
        for (k, v) in it {
            r.table.insert(k, Some(v))?;
        }
        Ok(r)
    }

    /// Copy of `other` with the requested behavior. Converting to a Set
    /// keeps keys only; converting a Set maps every member to itself.
    pub fn from_relation(behavior: Behavior, other: &Self) -> Result<Self> {
        Ok(Self::from_table(algebra::convert(&other.table, behavior)?))
    }

    /// Dict mapping `keys[i]` to `values[i]`.
    pub fn undump(keys: &[T], values: &[T]) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::InvalidArgument("undump needs at least one key"));
        }
        if keys.len() != values.len() {
            return Err(Error::InvalidArgument("undump keys and values differ in length"));
        }
        Self::from_pairs(
            Behavior::Dict,
            keys.iter().cloned().zip(values.iter().cloned()),
        )
    }

    #[inline]
    pub fn behavior(&self) -> Behavior {
        self.table.behavior()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Bucket count of the underlying table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Rebuilds the table sized for about `expected` entries. Entries
    /// and the dirty flag are kept; a frozen relation may be resized.
    pub fn resize(&mut self, expected: usize) -> Result<()> {
        self.table.resize(expected.max(self.len()))
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.memo.get().is_some() {
            return Err(Error::ImmutableViolation);
        }
        Ok(())
    }

    fn require_values(&self, op: &'static str) -> Result<()> {
        if !self.behavior().stores_values() {
            return Err(Error::incompatible(op, self.behavior()));
        }
        Ok(())
    }

    /// Adds a member to a Set. Returns `true` if it was not present.
    pub fn add(&mut self, member: T) -> Result<bool> {
        if self.behavior() != Behavior::Set {
            return Err(Error::incompatible("add", self.behavior()));
        }
        self.ensure_mutable()?;
        Ok(self.table.insert(member, None)?.is_new())
    }

    /// Stores `key -> value`. Sets store `key` and ignore `value`; Dicts
    /// replace an existing value. Returns `true` if a new entry was made.
    pub fn insert(&mut self, key: T, value: T) -> Result<bool> {
        self.ensure_mutable()?;
        Ok(self.table.insert(key, Some(value))?.is_new())
    }

    /// Value stored under `key`: the first one in chain order for a
    /// Graph, the member itself for a Set.
    pub fn get(&self, key: &T) -> Result<&T> {
        self.table
            .find_key(key)?
            .map(|e| e.value())
            .ok_or(Error::KeyNotFound)
    }

    pub fn contains_key(&self, key: &T) -> Result<bool> {
        Ok(self.table.find_key(key)?.is_some())
    }

    /// Pair membership. Sets test `key` only.
    pub fn contains(&self, key: &T, value: &T) -> Result<bool> {
        let hash = self.table.hash_of(key)?;
        Ok(self.table.find(hash, key, Some(value)).is_some())
    }

    /// Removes `key` with every value stored under it. Returns how many
    /// entries went.
    pub fn remove(&mut self, key: &T) -> Result<usize> {
        self.ensure_mutable()?;
        self.table.remove(key, None)
    }

    /// Removes the single pair `key -> value`.
    pub fn remove_pair(&mut self, key: &T, value: &T) -> Result<()> {
        self.require_values("remove_pair")?;
        self.ensure_mutable()?;
        self.table.remove(key, Some(value)).map(|_| ())
    }

    /// Drops every entry; capacity and the dirty flag stay.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.table.clear();
        Ok(())
    }

    /// Inserts every entry of `other` in place.
    ///
    /// Not atomic: if an insert fails, the entries copied so far stay.
    pub fn augment(&mut self, other: &Self) -> Result<()> {
        self.ensure_mutable()?;
        algebra::augment(&mut self.table, &other.table)?;
        if other.table.is_dirty() {
            self.table.set_dirty(true);
        }
        Ok(())
    }

    /// Values stored under `key`, in chain order.
    pub fn neighbors(&self, key: &T) -> Result<Vec<T>> {
        Ok(self.neighbors_iter(key)?.cloned().collect())
    }

    pub fn neighbors_iter<'a>(&'a self, key: &'a T) -> Result<Neighbors<'a, T>> {
        self.require_values("neighbors")?;
        let hash = self.table.hash_of(key)?;
        Ok(Neighbors {
            scan: self.table.key_scan(hash, key),
        })
    }

    /// `(key, value)` pairs in table order. Set members appear as
    /// `(member, member)`.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            scan: self.table.iter(),
        }
    }

    /// Distinct keys in table order.
    pub fn keys(&self) -> Result<Vec<T>> {
        if self.behavior() != Behavior::Graph {
            return Ok(self.table.iter().map(|e| e.key.clone()).collect());
        }
        let mut seen: RawTable<T, S> =
            RawTable::new(Behavior::Set, self.len(), self.table.hasher().clone())?;
        let mut out = Vec::new();
        for e in self.table.iter() {
            if seen.insert_hashed(e.hash, e.key.clone(), None)?.is_new() {
                out.push(e.key.clone());
            }
        }
        Ok(out)
    }

    /// Every value in table order, repeats included.
    pub fn values(&self) -> Vec<T> {
        self.table.iter().map(|e| e.value().clone()).collect()
    }

    /// Some key, the first in table order.
    pub fn choose_key(&self) -> Result<&T> {
        self.table
            .iter()
            .next()
            .map(|e| &e.key)
            .ok_or(Error::KeyNotFound)
    }

    /// Set to Dict mapping each member to itself.
    pub fn identity(&self) -> Result<Self> {
        Ok(Self::from_table(algebra::identity(&self.table)?))
    }

    pub fn is_subset(&self, other: &Self) -> Result<bool> {
        Ok(algebra::is_subset(&self.table, &other.table))
    }

    /// Entries of either. The result has the more general behavior.
    pub fn union(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_table(algebra::union(&self.table, &other.table)?))
    }

    /// Entries of both. The result has the less general behavior; a Set
    /// cannot be intersected with a Dict or Graph.
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_table(algebra::intersection(&self.table, &other.table)?))
    }

    /// Entries of `self` missing from `other`, with `self`'s behavior.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_table(algebra::difference(&self.table, &other.table)?))
    }

    /// `{(k, v) | (k, m) in self, (m, v) in other}`.
    pub fn compose(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_table(algebra::compose(&self.table, &other.table)?))
    }

    /// `{(v, k) | (k, v) in self}`. Not defined for Sets.
    pub fn transpose(&self) -> Result<Self> {
        Ok(Self::from_table(algebra::transpose(&self.table)?))
    }

    /// Smallest transitive Graph containing `self`. Graphs only.
    pub fn transitive_closure(&self) -> Result<Self> {
        Ok(Self::from_table(algebra::transitive_closure(&self.table)?))
    }

    /// Set of nodes reachable from `start` by one or more edges. `start`
    /// itself is included only if it lies on a cycle.
    pub fn reachable(&self, start: &T) -> Result<Self> {
        Ok(Self::from_table(algebra::reachable(&self.table, start)?))
    }

    /// Entries whose key is also a key of `keys`.
    pub fn restrict(&self, keys: &Self) -> Result<Self> {
        Ok(Self::from_table(algebra::restrict(&self.table, &keys.table)?))
    }

    /// `renamer ∘ self`, or `None` when the renaming is ambiguous. Dicts
    /// only.
    pub fn remap(&self, renamer: &Self) -> Result<Option<Self>> {
        Ok(algebra::remap(&self.table, &renamer.table)?.map(Self::from_table))
    }

    /// Value stored under each key, in order. Dicts and Graphs only.
    pub fn dump(&self, keys: &[T]) -> Result<Vec<T>> {
        self.require_values("dump")?;
        if keys.is_empty() {
            return Err(Error::InvalidArgument("dump needs at least one key"));
        }
        keys.iter().map(|k| self.get(k).cloned()).collect()
    }

    /// Neighbors of `dict[key]` in `self`, or `None` when `dict` has no
    /// `key`.
    pub fn dget(&self, dict: &Self, key: &T) -> Result<Option<Vec<T>>> {
        match dict.dump(core::slice::from_ref(key)) {
            Ok(mut vals) => match vals.pop() {
                Some(v) => self.neighbors(&v).map(Some),
                None => Ok(None),
            },
            Err(Error::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`dget`](Self::dget) for composite keys: the dumped values
    /// are combined with `pack` into the lookup key.
    pub fn dget_with<F>(&self, dict: &Self, keys: &[T], pack: F) -> Result<Option<Vec<T>>>
    where
        F: FnOnce(Vec<T>) -> T,
    {
        match dict.dump(keys) {
            Ok(vals) => self.neighbors(&pack(vals)).map(Some),
            Err(Error::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether `dict[key]` is a key of `self`; `false` when `dict` lacks
    /// `key`.
    pub fn dtest(&self, dict: &Self, key: &T) -> Result<bool> {
        match dict.dump(core::slice::from_ref(key)) {
            Ok(mut vals) => match vals.pop() {
                Some(v) => self.contains_key(&v),
                None => Ok(false),
            },
            Err(Error::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn dtest_with<F>(&self, dict: &Self, keys: &[T], pack: F) -> Result<bool>
    where
        F: FnOnce(Vec<T>) -> T,
    {
        match dict.dump(keys) {
            Ok(vals) => self.contains_key(&pack(vals)),
            Err(Error::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `true` until an overwrite or delete touched this relation or one
    /// it was derived from.
    pub fn is_clean(&self) -> bool {
        !self.table.is_dirty()
    }

    /// `Some(self)` when clean.
    pub fn clean(&self) -> Option<&Self> {
        self.is_clean().then_some(self)
    }

    pub fn mark_dirty(&mut self) {
        self.table.set_dirty(true);
    }

    pub fn mark_clean(&mut self) {
        self.table.set_dirty(false);
    }

    /// Order-independent hash of the entry set. The first call freezes
    /// the relation. Fails when a Dict/Graph value is unhashable.
    pub fn structural_hash(&self) -> Result<u64> {
        if let Some(h) = self.memo.get() {
            return Ok(h);
        }
        let with_values = self.behavior().stores_values();
        let mut acc = STRUCTURAL_SEED.wrapping_mul(self.len() as u64 + 1);
        for e in self.table.iter() {
            let mut this = e.hash;
            if with_values {
                let vh = self.table.hash_of(e.value())?;
                this = this.wrapping_add(vh.wrapping_mul(VALUE_WEIGHT));
            }
            acc ^= this;
        }
        self.memo.set(Some(acc));
        Ok(acc)
    }

    pub fn is_frozen(&self) -> bool {
        self.memo.get().is_some()
    }

    /// Checks every structural invariant of the underlying table.
    pub fn validate(&self) -> Result<()> {
        self.table.validate()
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> crate::TableStats {
        self.table.stats()
    }

    /// Group-by-group dump of the table.
    #[cfg(feature = "stats")]
    pub fn layout(&self) -> String
    where
        T: fmt::Debug,
    {
        self.table.layout()
    }
}

/// Iterator over `(key, value)` pairs of a [`Relation`].
pub struct Iter<'a, T> {
    scan: Scan<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (&'a T, &'a T);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.scan.next().map(|e| (&e.key, e.value()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.scan.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// Lazy values stored under one key.
pub struct Neighbors<'a, T> {
    scan: KeyScan<'a, T>,
}

impl<'a, T: Eq> Iterator for Neighbors<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        self.scan.next().map(|e| e.value())
    }
}

impl<'a, T, S> IntoIterator for &'a Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
    type Item = (&'a T, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// The copy is not frozen, even if `self` is.
impl<T: Element, S: Clone> Clone for Relation<T, S> {
    fn clone(&self) -> Self {
        Relation {
            table: self.table.clone(),
            memo: Cell::new(None),
        }
    }
}

impl<T, S> PartialEq for Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
    fn eq(&self, other: &Self) -> bool {
        self.behavior() == other.behavior()
            && self.len() == other.len()
            && algebra::is_subset(&self.table, &other.table)
    }
}

impl<T, S> Eq for Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
}

impl<T, S> PartialOrd for Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Behavior first, then entry count. Equal-sized relations compare by
/// the least `(hash, key, value)` entry each holds that the other lacks.
impl<T, S> Ord for Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.behavior()
            .cmp(&other.behavior())
            .then_with(|| self.len().cmp(&other.len()))
            .then_with(|| {
                let mine = algebra::min_diff(&self.table, &other.table);
                let theirs = algebra::min_diff(&other.table, &self.table);
                match (mine, theirs) {
                    (None, None) => Ordering::Equal,
                    (Some(a), Some(b)) => a.triple_cmp(b),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                }
            })
    }
}

/// Hashing a relation freezes it.
impl<T, S> Element for Relation<T, S>
where
    T: Element,
    S: StableHashState,
{
    fn element_hash<B: BuildHasher>(&self, build: &B) -> core::result::Result<u64, Unhashable> {
        let h = self.structural_hash().map_err(|_| Unhashable)?;
        Ok(build.hash_one(h))
    }
}

impl<T, S> fmt::Debug for Relation<T, S>
where
    T: Element + fmt::Debug,
    S: StableHashState,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.behavior())?;
        {
            let mut list = f.debug_list();
            if self.behavior() == Behavior::Set {
                list.entries(self.iter().map(|(k, _)| k));
            } else {
                list.entries(self.iter());
            }
            list.finish()?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Rel = Relation<i64>;

    #[test]
    fn set_counts_distinct_members() {
        let s = Rel::from_members([1, 2, 2, 3]).unwrap();
        assert_eq!(s.len(), 3);
        assert!(s.contains_key(&2).unwrap());
        assert!(!s.contains_key(&4).unwrap());
        assert_eq!(s.get(&3), Ok(&3));
    }

    #[test]
    fn dict_overwrite_dirties_and_replaces() {
        let mut d = Rel::dict().unwrap();
        assert!(d.insert(1, 100).unwrap());
        assert!(d.insert(2, 200).unwrap());
        assert!(!d.insert(1, 300).unwrap());
        assert!(!d.is_clean());
        assert_eq!(d.get(&1), Ok(&300));
        assert_eq!(d.len(), 2);
        d.mark_clean();
        assert!(d.clean().is_some());
    }

    #[test]
    fn frozen_relation_rejects_mutation() {
        let mut d = Rel::from_pairs(Behavior::Dict, [(1, 2)]).unwrap();
        d.structural_hash().unwrap();
        assert!(d.is_frozen());
        assert_eq!(d.insert(3, 4), Err(Error::ImmutableViolation));
        assert_eq!(d.remove(&1), Err(Error::ImmutableViolation));
        assert_eq!(d.clear(), Err(Error::ImmutableViolation));
        let thawed = d.clone();
        assert!(!thawed.is_frozen());
        assert_eq!(thawed, d);
    }

    #[test]
    fn structural_hash_ignores_insertion_order() {
        let a = Rel::from_pairs(Behavior::Graph, [(1, 2), (3, 4), (1, 5)]).unwrap();
        let b = Rel::from_pairs(Behavior::Graph, [(1, 5), (1, 2), (3, 4)]).unwrap();
        assert_eq!(a.structural_hash(), b.structural_hash());
        let c = Rel::from_pairs(Behavior::Graph, [(1, 5), (1, 2), (3, 6)]).unwrap();
        assert_ne!(a.structural_hash(), c.structural_hash());
    }

    #[test]
    fn behavior_specific_operations_are_checked() {
        let s = Rel::from_members([1]).unwrap();
        assert_eq!(
            s.neighbors(&1),
            Err(Error::incompatible("neighbors", Behavior::Set))
        );
        assert!(matches!(s.transpose(), Err(Error::IncompatibleBehavior { .. })));
        let mut d = Rel::dict().unwrap();
        assert!(matches!(d.add(1), Err(Error::IncompatibleBehavior { .. })));
        assert!(matches!(s.remap(&d), Err(Error::IncompatibleBehavior { .. })));
        d.insert(1, 1).unwrap();
        assert!(matches!(d.identity(), Err(Error::IncompatibleBehavior { .. })));
    }

    #[test]
    fn debug_renders_behavior_and_entries() {
        let s = Rel::from_members([7]).unwrap();
        assert_eq!(format!("{s:?}"), "Set([7])");
        let d = Rel::from_pairs(Behavior::Dict, [(1, 2)]).unwrap();
        assert_eq!(format!("{d:?}"), "Dict([(1, 2)])");
    }

    #[test]
    fn dump_and_undump_are_parallel() {
        let d = Rel::undump(&[1, 2, 3], &[10, 20, 30]).unwrap();
        assert_eq!(d.dump(&[3, 1]).unwrap(), vec![30, 10]);
        assert_eq!(d.dump(&[4]), Err(Error::KeyNotFound));
        assert!(matches!(Rel::undump(&[], &[]), Err(Error::InvalidArgument(_))));
        assert!(matches!(Rel::undump(&[1], &[1, 2]), Err(Error::InvalidArgument(_))));
    }
}
