use proptest::prelude::*;
use relbuckets::{Behavior, Relation};
use std::collections::BTreeSet;

type Rel = Relation<u8>;
type Pairs = BTreeSet<(u8, u8)>;

fn arb_pairs() -> impl Strategy<Value = Pairs> {
    proptest::collection::btree_set((0u8..12, 0u8..12), 0..40)
}

fn graph(p: &Pairs) -> Rel {
    Rel::from_pairs(Behavior::Graph, p.iter().copied()).unwrap()
}

fn pairs_of(r: &Rel) -> Pairs {
    r.iter().map(|(k, v)| (*k, *v)).collect()
}

fn compose_model(a: &Pairs, b: &Pairs) -> Pairs {
    let mut out = Pairs::new();
    for &(k, m) in a {
        for &(m2, v) in b {
            if m == m2 {
                out.insert((k, v));
            }
        }
    }
    out
}

fn closure_model(a: &Pairs) -> Pairs {
    let mut c = a.clone();
    loop {
        let step = compose_model(a, &c);
        let before = c.len();
        c.extend(step);
        if c.len() == before {
            return c;
        }
    }
}

fn reachable_model(a: &Pairs, start: u8) -> BTreeSet<u8> {
    let mut seen = BTreeSet::new();
    let mut todo = vec![start];
    while let Some(n) = todo.pop() {
        for &(k, v) in a {
            if k == n && seen.insert(v) {
                todo.push(v);
            }
        }
    }
    seen
}

// Property: Graph algebra agrees with set-of-pairs semantics.
// - union, intersection, difference and compose match the model.
// - transpose swaps every pair; closure is the model fixpoint.
// - No operation changes its inputs or breaks table invariants.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_graph_algebra_matches_model(a in arb_pairs(), b in arb_pairs()) {
        let ra = graph(&a);
        let rb = graph(&b);

        let u = ra.union(&rb).unwrap();
        prop_assert_eq!(pairs_of(&u), a.union(&b).copied().collect::<Pairs>());
        let i = ra.intersection(&rb).unwrap();
        prop_assert_eq!(pairs_of(&i), a.intersection(&b).copied().collect::<Pairs>());
        let d = ra.difference(&rb).unwrap();
        prop_assert_eq!(pairs_of(&d), a.difference(&b).copied().collect::<Pairs>());
        let c = ra.compose(&rb).unwrap();
        prop_assert_eq!(pairs_of(&c), compose_model(&a, &b));
        let t = ra.transpose().unwrap();
        prop_assert_eq!(pairs_of(&t), a.iter().map(|&(k, v)| (v, k)).collect::<Pairs>());
        let tc = ra.transitive_closure().unwrap();
        prop_assert_eq!(pairs_of(&tc), closure_model(&a));

        for r in [&u, &i, &d, &c, &t, &tc] {
            prop_assert!(r.validate().is_ok());
        }
        prop_assert_eq!(pairs_of(&ra), a);
        prop_assert_eq!(pairs_of(&rb), b);
    }
}

// Property: reachability equals a depth-first walk of the pairs.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_reachable_matches_walk(a in arb_pairs(), start in 0u8..12) {
        let r = graph(&a).reachable(&start).unwrap();
        let got: BTreeSet<u8> = r.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(got, reachable_model(&a, start));
    }
}

// Property: restriction keeps exactly the pairs whose key is a key of
// the restricting relation, whichever side is walked.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_restrict_matches_model(
        a in arb_pairs(),
        keys in proptest::collection::btree_set(0u8..12, 0..12),
    ) {
        let ks = Rel::from_members(keys.iter().copied()).unwrap();
        let r = graph(&a).restrict(&ks).unwrap();
        let expect: Pairs = a.iter().copied().filter(|(k, _)| keys.contains(k)).collect();
        prop_assert_eq!(pairs_of(&r), expect);
    }
}

// Property: equality, order and structural hash are consistent.
// - Relations are equal exactly when their pair sets are.
// - Equal relations hash equally and compare Equal.
// - cmp is antisymmetric.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_eq_ord_hash_consistent(a in arb_pairs(), b in arb_pairs()) {
        let ra = graph(&a);
        let rb = graph(&b);
        prop_assert_eq!(ra == rb, a == b);
        prop_assert_eq!(ra.cmp(&rb), rb.cmp(&ra).reverse());
        let rebuilt = Rel::from_pairs(Behavior::Graph, a.iter().rev().copied()).unwrap();
        prop_assert_eq!(ra.cmp(&rebuilt), std::cmp::Ordering::Equal);
        prop_assert_eq!(ra.structural_hash().unwrap(), rebuilt.structural_hash().unwrap());
    }
}

// Property: random inserts and deletes on a Dict behave like a map, and
// the dirty flag is set exactly when an overwrite changed a value or a
// delete removed something.
proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]
    #[test]
    fn prop_dict_behaves_like_map(
        ops in proptest::collection::vec((any::<bool>(), 0u8..20, 0u8..4), 1..200),
    ) {
        let mut d = Rel::dict().unwrap();
        let mut model = std::collections::BTreeMap::new();
        let mut dirty = false;
        for (insert, k, v) in ops {
            if insert {
                let new = d.insert(k, v).unwrap();
                match model.insert(k, v) {
                    None => prop_assert!(new),
                    Some(old) => {
                        prop_assert!(!new);
                        dirty |= old != v;
                    }
                }
            } else {
                let removed = d.remove(&k).is_ok();
                prop_assert_eq!(removed, model.remove(&k).is_some());
                dirty |= removed;
            }
            prop_assert_eq!(d.len(), model.len());
            prop_assert_eq!(d.is_clean(), !dirty);
        }
        d.validate().unwrap();
        for (k, v) in &model {
            prop_assert_eq!(d.get(k).unwrap(), v);
        }
    }
}
