//! Per-behavior bucket matching.
//!
//! The table engine is shared by Set, Dict and Graph. What differs is how
//! a single bucket answers "does this entry match?" and "may this entry be
//! stored here?". Both questions live here so the chain walk in
//! [`table`](crate::table) stays behavior-agnostic.

use crate::group::{Bucket, Entry};
use core::fmt;

/// How a relation stores associations. Declaration order is generality:
/// `Set < Dict < Graph`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Behavior {
    /// Members only; the value of a member is the member itself.
    Set,
    /// At most one value per key.
    Dict,
    /// Any number of distinct values per key.
    Graph,
}

/// Direction used by [`Behavior::coerce`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Generality {
    More,
    Less,
}

impl Behavior {
    pub fn coerce(self, other: Behavior, prefer: Generality) -> Behavior {
        match prefer {
            Generality::More => self.max(other),
            Generality::Less => self.min(other),
        }
    }

    #[inline]
    pub fn stores_values(self) -> bool {
        self != Behavior::Set
    }

    /// Unforced match of a stored entry against a probe.
    pub(crate) fn matches<T: Eq>(self, entry: &Entry<T>, probe: &Probe<'_, T>) -> bool {
        if entry.hash != probe.hash || entry.key != *probe.key {
            return false;
        }
        match (self, probe.value) {
            (Behavior::Set, _) | (_, None) => true,
            (_, Some(v)) => entry.value() == v,
        }
    }

    /// Forced placement of `pending` at `bucket`. An empty bucket always
    /// accepts; an occupied one accepts only what the behavior allows.
    pub(crate) fn force<T: Eq>(self, bucket: &mut Bucket<T>, pending: Entry<T>) -> Forced<T> {
        let stored = match bucket {
            Some(stored) => stored,
            None => {
                *bucket = Some(pending);
                return Forced::Inserted;
            }
        };
        if stored.hash != pending.hash || stored.key != pending.key {
            return Forced::Rejected(pending);
        }
        match self {
            Behavior::Set => Forced::Present,
            Behavior::Dict => {
                let changed = stored.value != pending.value;
                if changed {
                    stored.value = pending.value;
                }
                Forced::Overwritten { changed }
            }
            Behavior::Graph => {
                if stored.value == pending.value {
                    Forced::Present
                } else {
                    Forced::Rejected(pending)
                }
            }
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Behavior::Set => "Set",
            Behavior::Dict => "Dict",
            Behavior::Graph => "Graph",
        })
    }
}

/// What a keyed lookup is looking for.
pub(crate) struct Probe<'a, T> {
    pub hash: u64,
    pub key: &'a T,
    /// `None` matches any value stored under the key.
    pub value: Option<&'a T>,
}

impl<T> Clone for Probe<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Probe<'_, T> {}

#[derive(Debug)]
pub(crate) enum Forced<T> {
    Inserted,
    /// An equal entry is already stored; the pending one was dropped.
    Present,
    /// Dict key matched; its value was replaced when `changed`.
    Overwritten { changed: bool },
    /// Bucket occupied by something else; the entry comes back.
    Rejected(Entry<T>),
}
