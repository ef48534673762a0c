#![cfg(test)]

// Property tests for RawTable kept inside the crate so they can drive the
// engine and its structural validator directly.

use crate::behavior::Behavior;
use crate::element::Element;
use crate::error::{Error, Unhashable};
use crate::table::{Placed, RawTable};
use crate::DefaultHashState;
use core::hash::BuildHasher;
use hashbrown::HashSet;
use proptest::prelude::*;

// Element whose hash is squeezed into `spread` distinct values, so small
// spreads pile everything into a few long chains.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Crowded {
    id: u16,
    spread: u16,
}

impl Element for Crowded {
    fn element_hash<B: BuildHasher>(&self, _b: &B) -> Result<u64, Unhashable> {
        Ok(u64::from(self.id % self.spread))
    }
}

// Keys and values are small pool indices; shrinking moves toward low ids
// and shorter op lists.
#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u16),
    Remove(u16),
    RemovePair(u16, u16),
    Find(u16),
    FindPair(u16, u16),
    Clear,
    Resize(usize),
    Scan,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let key = 0u16..24;
    let val = 100u16..106;
    let op = prop_oneof![
        6 => (key.clone(), val.clone()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => key.clone().prop_map(Op::Remove),
        2 => (key.clone(), val.clone()).prop_map(|(k, v)| Op::RemovePair(k, v)),
        2 => key.clone().prop_map(Op::Find),
        2 => (key, val).prop_map(|(k, v)| Op::FindPair(k, v)),
        1 => Just(Op::Clear),
        1 => (0usize..200).prop_map(Op::Resize),
        1 => Just(Op::Scan),
    ];
    proptest::collection::vec(op, 1..150)
}

fn arb_behavior() -> impl Strategy<Value = Behavior> {
    prop_oneof![
        Just(Behavior::Set),
        Just(Behavior::Dict),
        Just(Behavior::Graph)
    ]
}

// Reference semantics over a plain pair set. Set members are stored as
// `(k, k)`.
struct Model {
    behavior: Behavior,
    pairs: HashSet<(u16, u16)>,
    dirty: bool,
}

impl Model {
    fn value_of(&self, k: u16) -> Option<u16> {
        self.pairs.iter().find(|p| p.0 == k).map(|p| p.1)
    }

    fn has_key(&self, k: u16) -> bool {
        self.value_of(k).is_some()
    }

    fn has_pair(&self, k: u16, v: u16) -> bool {
        match self.behavior {
            Behavior::Set => self.has_key(k),
            _ => self.pairs.contains(&(k, v)),
        }
    }

    fn insert(&mut self, k: u16, v: u16) -> Placed {
        match self.behavior {
            Behavior::Set => {
                if self.pairs.insert((k, k)) {
                    Placed::New
                } else {
                    Placed::Present
                }
            }
            Behavior::Dict => match self.value_of(k) {
                None => {
                    self.pairs.insert((k, v));
                    Placed::New
                }
                Some(old) if old == v => Placed::Overwritten { changed: false },
                Some(old) => {
                    self.pairs.remove(&(k, old));
                    self.pairs.insert((k, v));
                    self.dirty = true;
                    Placed::Overwritten { changed: true }
                }
            },
            Behavior::Graph => {
                if self.pairs.insert((k, v)) {
                    Placed::New
                } else {
                    Placed::Present
                }
            }
        }
    }

    fn remove(&mut self, k: u16, v: Option<u16>) -> usize {
        let before = self.pairs.len();
        let set = self.behavior == Behavior::Set;
        self.pairs
            .retain(|&(pk, pv)| !(pk == k && (set || v.map_or(true, |v| v == pv))));
        let removed = before - self.pairs.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }
}

fn el(id: u16, spread: u16) -> Crowded {
    Crowded { id, spread }
}

// Property: state-machine equivalence against a pair-set model.
// Invariants exercised across random operation sequences:
// - Forced insert outcome (new / present / overwritten) matches the model.
// - Unforced key and pair lookups agree with the model.
// - Delete removes exactly the matching entries; misses are KeyNotFound.
// - Full scan yields each entry exactly once.
// - `validate()` holds after every step: chain packing, free list,
//   home placement, entry count.
// - Dirty flag tracks overwrites and deletes; resize and clear keep it.
proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]
    #[test]
    fn prop_table_matches_model(
        behavior in arb_behavior(),
        spread in prop_oneof![Just(1u16), Just(3u16), Just(1000u16)],
        ops in arb_ops(),
    ) {
        let mut sut: RawTable<Crowded, DefaultHashState> =
            RawTable::new(behavior, 0, DefaultHashState::default()).unwrap();
        let mut model = Model { behavior, pairs: HashSet::new(), dirty: false };

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let got = sut.insert(el(k, spread), Some(el(v, spread))).unwrap();
                    prop_assert_eq!(got, model.insert(k, v));
                }
                Op::Remove(k) => {
                    let expect = model.remove(k, None);
                    match sut.remove(&el(k, spread), None) {
                        Ok(n) => prop_assert_eq!(n, expect),
                        Err(Error::KeyNotFound) => prop_assert_eq!(expect, 0),
                        Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                    }
                }
                Op::RemovePair(k, v) => {
                    let expect = model.remove(k, Some(v));
                    match sut.remove(&el(k, spread), Some(&el(v, spread))) {
                        Ok(n) => prop_assert_eq!(n, expect),
                        Err(Error::KeyNotFound) => prop_assert_eq!(expect, 0),
                        Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                    }
                }
                Op::Find(k) => {
                    let found = sut.find_key(&el(k, spread)).unwrap();
                    prop_assert_eq!(found.is_some(), model.has_key(k));
                    if behavior == Behavior::Dict {
                        prop_assert_eq!(found.map(|e| e.value().id), model.value_of(k));
                    }
                }
                Op::FindPair(k, v) => {
                    let key = el(k, spread);
                    let hash = sut.hash_of(&key).unwrap();
                    let found = sut.find(hash, &key, Some(&el(v, spread))).is_some();
                    prop_assert_eq!(found, model.has_pair(k, v));
                }
                Op::Clear => {
                    sut.clear();
                    model.pairs.clear();
                }
                Op::Resize(n) => {
                    sut.resize(n).unwrap();
                }
                Op::Scan => {
                    let seen: Vec<(u16, u16)> =
                        sut.iter().map(|e| (e.key.id, e.value().id)).collect();
                    let distinct: HashSet<(u16, u16)> = seen.iter().copied().collect();
                    prop_assert_eq!(seen.len(), distinct.len(), "scan repeated an entry");
                    prop_assert_eq!(distinct, model.pairs.clone());
                }
            }
            prop_assert_eq!(sut.len(), model.pairs.len());
            prop_assert_eq!(sut.is_dirty(), model.dirty);
            prop_assert!(sut.validate().is_ok(), "invariants broken: {:?}", sut.validate());
        }
    }
}

// Property: growth followed by mass deletion keeps every survivor
// reachable and ends in a smaller table.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_grow_then_shrink_preserves_survivors(
        n in 80u16..400,
        keep in 1u16..8,
        spread in prop_oneof![Just(7u16), Just(1000u16)],
    ) {
        let mut sut: RawTable<Crowded, DefaultHashState> =
            RawTable::new(Behavior::Set, 0, DefaultHashState::default()).unwrap();
        for id in 0..n {
            sut.insert(el(id, spread), None).unwrap();
        }
        let grown = sut.group_count();
        for id in keep..n {
            prop_assert_eq!(sut.remove(&el(id, spread), None).unwrap(), 1);
        }
        prop_assert!(sut.validate().is_ok());
        prop_assert!(sut.group_count() < grown);
        for id in 0..keep {
            prop_assert!(sut.find_key(&el(id, spread)).unwrap().is_some());
        }
        prop_assert_eq!(sut.len(), keep as usize);
    }
}
