//! Relational algebra over tables.
//!
//! Everything here is built from full scans, keyed scans, unforced
//! lookups and forced inserts on `RawTable`; nothing reaches into the
//! group array. Operations that produce a relation build a fresh table
//! and return it only on success, so a failure part way leaves every
//! input untouched. Results inherit the dirty flag of every input.
//!
//! Stored hashes cross table boundaries (a left entry's hash is used to
//! probe the right table), so all operands must hash with agreeing
//! `BuildHasher`s. Results use a clone of the left operand's hasher.

use crate::behavior::{Behavior, Generality};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::group::Entry;
use crate::table::RawTable;
use core::hash::BuildHasher;
use tracing::trace;

/// Restrict walks the key table instead of the container once the
/// container has more than this many times as many entries.
const RESTRICT_WALK_KEYS_RATIO: usize = 4;

fn fresh<T: Element, S: BuildHasher + Clone>(
    like: &RawTable<T, S>,
    behavior: Behavior,
    expected: usize,
) -> Result<RawTable<T, S>> {
    RawTable::new(behavior, expected, like.hasher().clone())
}

fn inherit_dirt<T: Element, S: BuildHasher>(out: &mut RawTable<T, S>, from: &[&RawTable<T, S>]) {
    let dirty = out.is_dirty() || from.iter().any(|t| t.is_dirty());
    out.set_dirty(dirty);
}

/// Forced insert of every entry of `source` into `target`.
pub(crate) fn augment<T: Element, S: BuildHasher>(
    target: &mut RawTable<T, S>,
    source: &RawTable<T, S>,
) -> Result<()> {
    for e in source.iter() {
        target.insert_entry(e)?;
    }
    Ok(())
}

/// Inserts `(v, k)` for every `(k, v)` of `source`. A Set target receives
/// both `k` and `v` as members.
pub(crate) fn transpose_into<T: Element, S: BuildHasher>(
    target: &mut RawTable<T, S>,
    source: &RawTable<T, S>,
) -> Result<()> {
    if source.behavior() == Behavior::Set {
        return Err(Error::incompatible("transpose", Behavior::Set));
    }
    let target_is_set = target.behavior() == Behavior::Set;
    for e in source.iter() {
        let v = e.value();
        let vhash = target.hash_of(v)?;
        if target_is_set {
            target.insert_hashed(e.hash, e.key.clone(), None)?;
            target.insert_hashed(vhash, v.clone(), None)?;
        } else {
            target.insert_hashed(vhash, v.clone(), Some(e.key.clone()))?;
        }
    }
    Ok(())
}

/// Relational join: for each `(k, m)` of `left` and each `(m, v)` of
/// `right`, emits `(k, v)` unless `mask` already holds it. A Set on the
/// left joins through its members. Returns the number of emitted pairs,
/// duplicates included; with no target only the count is produced.
pub(crate) fn compose_into<T: Element, S: BuildHasher>(
    mut target: Option<&mut RawTable<T, S>>,
    left: &RawTable<T, S>,
    right: &RawTable<T, S>,
    mask: Option<&RawTable<T, S>>,
) -> Result<usize> {
    let left_is_set = left.behavior() == Behavior::Set;
    let mut emitted = 0usize;
    for l in left.iter() {
        let (mid, mid_hash) = if left_is_set {
            (&l.key, l.hash)
        } else {
            (l.value(), right.hash_of(l.value())?)
        };
        for r in right.key_scan(mid_hash, mid) {
            let v = r.value();
            if let Some(m) = mask {
                if m.find(l.hash, &l.key, Some(v)).is_some() {
                    continue;
                }
            }
            if let Some(t) = target.as_mut() {
                t.insert_hashed(l.hash, l.key.clone(), Some(v.clone()))?;
            }
            emitted += 1;
        }
    }
    Ok(emitted)
}

/// Keeps the entries of `left` whose membership in `right` equals
/// `include`. Returns how many were kept.
pub(crate) fn intersect_diff_into<T: Element, S: BuildHasher>(
    mut target: Option<&mut RawTable<T, S>>,
    left: &RawTable<T, S>,
    right: &RawTable<T, S>,
    include: bool,
) -> Result<usize> {
    let mut kept = 0usize;
    for e in left.iter() {
        let member = right.find(e.hash, &e.key, Some(e.value())).is_some();
        if member == include {
            if let Some(t) = target.as_mut() {
                t.insert_entry(e)?;
            }
            kept += 1;
        }
    }
    Ok(kept)
}

/// The least `(hash, key, value)` entry of `left` missing from `right`.
pub(crate) fn min_diff<'a, T: Element, S: BuildHasher>(
    left: &'a RawTable<T, S>,
    right: &RawTable<T, S>,
) -> Option<&'a Entry<T>> {
    let mut best: Option<&Entry<T>> = None;
    for e in left.iter() {
        if right.find(e.hash, &e.key, Some(e.value())).is_some() {
            continue;
        }
        if best.map_or(true, |b| e.triple_cmp(b).is_lt()) {
            best = Some(e);
        }
    }
    best
}

pub(crate) fn is_subset<T: Element, S: BuildHasher>(
    sub: &RawTable<T, S>,
    sup: &RawTable<T, S>,
) -> bool {
    sub.iter()
        .all(|e| sup.find(e.hash, &e.key, Some(e.value())).is_some())
}

/// Copy of `source` with the given behavior.
pub(crate) fn convert<T: Element, S: BuildHasher + Clone>(
    source: &RawTable<T, S>,
    behavior: Behavior,
) -> Result<RawTable<T, S>> {
    let mut out = fresh(source, behavior, source.len())?;
    augment(&mut out, source)?;
    inherit_dirt(&mut out, &[source]);
    Ok(out)
}

pub(crate) fn union<T: Element, S: BuildHasher + Clone>(
    left: &RawTable<T, S>,
    right: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    let behavior = left.behavior().coerce(right.behavior(), Generality::More);
    let mut out = fresh(left, behavior, left.len().max(right.len()))?;
    augment(&mut out, left)?;
    augment(&mut out, right)?;
    inherit_dirt(&mut out, &[left, right]);
    Ok(out)
}

fn reject_mixed_sets(
    op: &'static str,
    left: Behavior,
    right: Behavior,
) -> Result<()> {
    if (left == Behavior::Set) != (right == Behavior::Set) {
        let offender = if left == Behavior::Set { right } else { left };
        return Err(Error::incompatible(op, offender));
    }
    Ok(())
}

/// Entries present in both. Walks the smaller operand.
pub(crate) fn intersection<T: Element, S: BuildHasher + Clone>(
    left: &RawTable<T, S>,
    right: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    reject_mixed_sets("intersection", left.behavior(), right.behavior())?;
    let behavior = left.behavior().coerce(right.behavior(), Generality::Less);
    let (small, large) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    let count = intersect_diff_into(None, small, large, true)?;
    let mut out = fresh(left, behavior, count)?;
    intersect_diff_into(Some(&mut out), small, large, true)?;
    inherit_dirt(&mut out, &[left, right]);
    Ok(out)
}

pub(crate) fn difference<T: Element, S: BuildHasher + Clone>(
    left: &RawTable<T, S>,
    right: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    reject_mixed_sets("difference", left.behavior(), right.behavior())?;
    let count = intersect_diff_into(None, left, right, false)?;
    let mut out = fresh(left, left.behavior(), count)?;
    intersect_diff_into(Some(&mut out), left, right, false)?;
    inherit_dirt(&mut out, &[left, right]);
    Ok(out)
}

pub(crate) fn compose<T: Element, S: BuildHasher + Clone>(
    left: &RawTable<T, S>,
    right: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    let behavior = left.behavior().coerce(right.behavior(), Generality::More);
    let count = compose_into(None, left, right, None)?;
    let mut out = fresh(left, behavior, count)?;
    compose_into(Some(&mut out), left, right, None)?;
    inherit_dirt(&mut out, &[left, right]);
    Ok(out)
}

pub(crate) fn transpose<T: Element, S: BuildHasher + Clone>(
    source: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    let mut out = fresh(source, source.behavior(), source.len())?;
    transpose_into(&mut out, source)?;
    inherit_dirt(&mut out, &[source]);
    Ok(out)
}

/// Least fixpoint of `closure := closure ∪ (source ∘ closure)`.
pub(crate) fn transitive_closure<T: Element, S: BuildHasher + Clone>(
    source: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    if source.behavior() != Behavior::Graph {
        return Err(Error::incompatible("transitive_closure", source.behavior()));
    }
    let mut closure = convert(source, Behavior::Graph)?;
    let mut delta = fresh(source, Behavior::Graph, 0)?;
    let mut round = 0usize;
    loop {
        round += 1;
        let added = compose_into(Some(&mut delta), source, &closure, Some(&closure))?;
        trace!(round, added, closure = closure.len(), "transitive closure round");
        if added == 0 {
            break;
        }
        augment(&mut closure, &delta)?;
        delta.clear();
    }
    Ok(closure)
}

/// Nodes reachable from `start` by one or more edges.
pub(crate) fn reachable<T: Element, S: BuildHasher + Clone>(
    graph: &RawTable<T, S>,
    start: &T,
) -> Result<RawTable<T, S>> {
    if graph.behavior() == Behavior::Set {
        return Err(Error::incompatible("reachable", Behavior::Set));
    }
    let mut result = fresh(graph, Behavior::Set, 0)?;
    let mut frontier = fresh(graph, Behavior::Set, 0)?;
    let mut next = fresh(graph, Behavior::Set, 0)?;
    frontier.insert(start.clone(), None)?;
    let mut round = 0usize;
    while !frontier.is_empty() {
        round += 1;
        for f in frontier.iter() {
            for edge in graph.key_scan(f.hash, &f.key) {
                let v = edge.value();
                let h = next.hash_of(v)?;
                next.insert_hashed(h, v.clone(), None)?;
            }
        }
        frontier.clear();
        intersect_diff_into(Some(&mut frontier), &next, &result, false)?;
        next.clear();
        augment(&mut result, &frontier)?;
        trace!(round, frontier = frontier.len(), reached = result.len(), "reachability round");
    }
    inherit_dirt(&mut result, &[graph]);
    Ok(result)
}

/// Entries of `container` whose key is a key of `keys`.
pub(crate) fn restrict<T: Element, S: BuildHasher + Clone>(
    container: &RawTable<T, S>,
    keys: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    let mut out = fresh(container, container.behavior(), 0)?;
    if container.len() > RESTRICT_WALK_KEYS_RATIO.saturating_mul(keys.len()) {
        let mut seen = fresh(keys, Behavior::Set, keys.len())?;
        for k in keys.iter() {
            // Graph key tables repeat keys.
            if !seen.insert_hashed(k.hash, k.key.clone(), None)?.is_new() {
                continue;
            }
            for e in container.key_scan(k.hash, &k.key) {
                out.insert_entry(e)?;
            }
        }
    } else {
        for e in container.iter() {
            if keys.find(e.hash, &e.key, None).is_some() {
                out.insert_entry(e)?;
            }
        }
    }
    inherit_dirt(&mut out, &[container, keys]);
    Ok(out)
}

/// Set to Dict mapping every member to itself.
pub(crate) fn identity<T: Element, S: BuildHasher + Clone>(
    set: &RawTable<T, S>,
) -> Result<RawTable<T, S>> {
    if set.behavior() != Behavior::Set {
        return Err(Error::incompatible("identity", set.behavior()));
    }
    convert(set, Behavior::Dict)
}

/// `renamer ∘ dict` as a Dict, or `None` when the result would depend on
/// overwrites (dirty inputs, or two renamed keys colliding with
/// different values).
pub(crate) fn remap<T: Element, S: BuildHasher + Clone>(
    dict: &RawTable<T, S>,
    renamer: &RawTable<T, S>,
) -> Result<Option<RawTable<T, S>>> {
    if dict.behavior() != Behavior::Dict {
        return Err(Error::incompatible("remap", dict.behavior()));
    }
    if dict.is_dirty() || renamer.is_dirty() {
        return Ok(None);
    }
    let mut out = fresh(dict, Behavior::Dict, renamer.len())?;
    compose_into(Some(&mut out), renamer, dict, None)?;
    if out.is_dirty() {
        return Ok(None);
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultHashState;

    type Table = RawTable<u32, DefaultHashState>;

    fn build(behavior: Behavior, pairs: &[(u32, u32)]) -> Table {
        let mut t = RawTable::new(behavior, 0, DefaultHashState::default()).unwrap();
        for &(k, v) in pairs {
            t.insert(k, Some(v)).unwrap();
        }
        t
    }

    fn pairs(t: &Table) -> Vec<(u32, u32)> {
        let mut v: Vec<_> = t.iter().map(|e| (e.key, *e.value())).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn compose_count_only_matches_materialized() {
        let l = build(Behavior::Graph, &[(1, 2), (1, 3), (4, 2)]);
        let r = build(Behavior::Graph, &[(2, 9), (3, 9), (2, 8)]);
        let count = compose_into(None, &l, &r, None).unwrap();
        assert_eq!(count, 5);
        let out = compose(&l, &r).unwrap();
        assert_eq!(pairs(&out), vec![(1, 8), (1, 9), (4, 8), (4, 9)]);
    }

    #[test]
    fn mask_excludes_known_pairs() {
        let l = build(Behavior::Graph, &[(1, 2)]);
        let r = build(Behavior::Graph, &[(2, 3), (2, 4)]);
        let mask = build(Behavior::Graph, &[(1, 3)]);
        let mut out = build(Behavior::Graph, &[]);
        assert_eq!(compose_into(Some(&mut out), &l, &r, Some(&mask)).unwrap(), 1);
        assert_eq!(pairs(&out), vec![(1, 4)]);
    }

    #[test]
    fn closure_and_reachability_follow_paths() {
        let g = build(Behavior::Graph, &[(1, 2), (2, 3), (3, 4)]);
        let c = transitive_closure(&g).unwrap();
        assert_eq!(
            pairs(&c),
            vec![(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]
        );
        let r = reachable(&g, &2).unwrap();
        let mut nodes: Vec<u32> = r.iter().map(|e| e.key).collect();
        nodes.sort_unstable();
        assert_eq!(nodes, vec![3, 4]);
    }

    #[test]
    fn closure_requires_graph() {
        let d = build(Behavior::Dict, &[(1, 2)]);
        assert_eq!(
            transitive_closure(&d).err(),
            Some(Error::incompatible("transitive_closure", Behavior::Dict))
        );
    }

    #[test]
    fn min_diff_picks_least_missing_triple() {
        let l = build(Behavior::Dict, &[(1, 1), (2, 2), (3, 3)]);
        let r = build(Behavior::Dict, &[(2, 2)]);
        let m = min_diff(&l, &r).unwrap();
        let expect = l
            .iter()
            .filter(|e| e.key != 2)
            .min_by(|a, b| a.triple_cmp(b))
            .map(|e| e.key);
        assert_eq!(Some(m.key), expect);
        assert!(min_diff(&r, &l).is_none());
    }

    #[test]
    fn restrict_walks_either_side_with_same_result() {
        let big: Vec<(u32, u32)> = (0..50).map(|k| (k, k + 1)).collect();
        let c = build(Behavior::Dict, &big);
        let few = build(Behavior::Graph, &[(3, 0), (3, 1), (7, 0), (99, 0)]);
        let walked_keys = restrict(&c, &few).unwrap();
        assert_eq!(pairs(&walked_keys), vec![(3, 4), (7, 8)]);
        let many: Vec<(u32, u32)> = (0..40).map(|k| (k * 2, 0)).collect();
        let keys = build(Behavior::Dict, &many);
        let walked_container = restrict(&c, &keys).unwrap();
        assert!(walked_container.iter().all(|e| e.key % 2 == 0));
        assert_eq!(walked_container.len(), 25);
    }

    #[test]
    fn remap_rejects_colliding_renames() {
        let d = build(Behavior::Dict, &[(1, 10), (2, 20)]);
        let ok = build(Behavior::Dict, &[(100, 1), (200, 2)]);
        let out = remap(&d, &ok).unwrap().unwrap();
        assert_eq!(pairs(&out), vec![(100, 10), (200, 20)]);
        let clash = build(Behavior::Graph, &[(100, 1), (100, 2)]);
        assert!(remap(&d, &clash).unwrap().is_none());
    }

    #[test]
    fn results_inherit_dirt() {
        let mut a = build(Behavior::Dict, &[(1, 1)]);
        a.insert(1, Some(2)).unwrap();
        assert!(a.is_dirty());
        let b = build(Behavior::Dict, &[(5, 5)]);
        assert!(union(&a, &b).unwrap().is_dirty());
        assert!(difference(&b, &a).unwrap().is_dirty());
        assert!(!union(&b, &b).unwrap().is_dirty());
    }
}
