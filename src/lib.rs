//! relbuckets: Sets, Dicts and Graphs over one bucket-group hash table,
//! with the relational algebra (union, intersection, difference,
//! composition, transpose, transitive closure, reachability, restriction,
//! remap) built on top of it.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one table engine for three associative containers whose only
//!   difference is matching and insertion policy.
//! - Layers:
//!   - HashCore (`hash_core`, `group`): a group array of `GSIZE` buckets
//!     per group. Home groups head circular overflow chains; free groups
//!     sit on a circular doubly-linked free list with O(1) acquire,
//!     release and targeted removal.
//!   - Behavior (`behavior`): the per-bucket match and forced-placement
//!     rules for Set, Dict and Graph. Lookup, insert-if-absent,
//!     insert-or-update and "next value for key" all funnel through it.
//!   - Cursors (`cursor`): a full scan in group order and a keyed scan
//!     over one chain, both resumable and both borrowing the table shared.
//!   - RawTable (`table`): forced insert (growing on demand), delete with
//!     chain backfill and shrink, resize, clear.
//!   - Algebra (`algebra`): relational operations composed from scans,
//!     lookups and forced inserts only.
//!   - Relation (`relation`): the public container. Adds the dirty-flag
//!     accessors and the memoized structural hash that freezes it.
//!
//! Constraints
//! - Single-threaded: tables are `!Send`/`!Sync` (no atomics, no locks).
//! - Entries within a chain are packed: walking a chain from its root,
//!   no occupied bucket follows an empty one. Inserts stop at the first
//!   empty bucket and deletes backfill to keep it so.
//! - Overflow groups are appended at the chain tail, so a chain's tail
//!   group is the only one that may have empty buckets.
//! - A home slot in use as someone else's overflow is reclaimed by
//!   copying that group to a free one and splicing the copy in.
//! - Hashes are computed once and stored. Resize, backfill and copies
//!   between relations reuse the stored hash.
//!
//! Ownership
//! - Storing an element clones it; removing or overwriting it drops the
//!   stored copy. Backfill moves owned entries between buckets, so no
//!   element is dropped mid-move. Use `Rc<T>` elements for shared
//!   ownership.
//! - Entries removed by a delete are dropped after the table is
//!   consistent again and its reentrancy guard is released.
//!
//! Reentrancy policy
//! - Mutation takes `&mut`, so the borrow checker rules out a live cursor
//!   across a mutating call.
//! - Element `Eq`/`Ord`/hash code runs inside table operations. A debug
//!   build panics if such code re-enters the same table; release builds
//!   carry no guard.
//!
//! Failure atomicity
//! - Resize allocates the new group array before moving anything, so an
//!   allocation failure leaves the table unchanged.
//! - The shrink after a delete is best-effort: if it cannot allocate, the
//!   delete still succeeds and the larger table is kept.
//! - Algebra operations build a fresh result and hand it out only on
//!   success. In-place `Relation::augment` is the exception: a failure
//!   part way keeps what was already copied.
//!
//! Logging
//! - `tracing` events only: `debug!` on resize, on a skipped shrink and on
//!   home-slot swap-out; `trace!` on backfill and on closure/reachability
//!   rounds. The crate never installs a subscriber.
//!
//! Notes and non-goals
//! - No persistence, no concurrent writers, no secondary indexes.
//! - The `stats` feature exposes `TableStats` and a group-by-group dump.

mod algebra;
mod behavior;
mod cursor;
mod element;
mod error;
mod group;
mod hash_core;
mod reentrancy;
mod relation;
mod table;
mod table_proptest;

use std::collections::hash_map::DefaultHasher;
use std::hash::BuildHasherDefault;

// Public surface
pub use behavior::{Behavior, Generality};
pub use element::Element;
pub use error::{Error, Result, Unhashable};
#[cfg(feature = "stats")]
pub use hash_core::TableStats;
pub use relation::{Iter, Neighbors, Relation};

/// Deterministic hasher used when none is given. Every instance hashes
/// identically, which lets relations share stored hashes.
pub type DefaultHashState = BuildHasherDefault<DefaultHasher>;

mod sealed {
    pub trait Sealed {}

    impl<H> Sealed for std::hash::BuildHasherDefault<H> {}
}

/// Hash state a [`Relation`] can use: every `S::default()` instance must
/// hash identically, because binary operations probe one relation with
/// hashes stored by another. Sealed; implemented only for
/// [`BuildHasherDefault`], whose hashers start from a fixed state.
///
/// Randomly keyed states are rejected at compile time:
///
/// ```compile_fail
/// use relbuckets::Relation;
/// use std::collections::hash_map::RandomState;
///
/// let _ = Relation::<u32, RandomState>::set();
/// ```
pub trait StableHashState: std::hash::BuildHasher + Clone + Default + sealed::Sealed {}

impl<H: std::hash::Hasher + Default> StableHashState for BuildHasherDefault<H> {}
