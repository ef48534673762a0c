//! Buckets and bucket groups: the unit of storage in a table.

/// Buckets per group.
pub(crate) const GSIZE: usize = 4;

/// One stored association. Set entries keep `value == None` and report
/// the key as their value.
#[derive(Clone, Debug)]
pub(crate) struct Entry<T> {
    pub hash: u64,
    pub key: T,
    pub value: Option<T>,
}

impl<T> Entry<T> {
    #[inline]
    pub fn value(&self) -> &T {
        self.value.as_ref().unwrap_or(&self.key)
    }
}

impl<T: Ord> Entry<T> {
    /// Orders by stored hash, then key, then value.
    pub fn triple_cmp(&self, other: &Entry<T>) -> core::cmp::Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| self.value().cmp(other.value()))
    }
}

pub(crate) type Bucket<T> = Option<Entry<T>>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum GroupState {
    /// Transient, only while (re)threading.
    Unknown,
    Free,
    /// Head of the chain for its own home index.
    Root,
    /// Non-head member of some chain.
    Overflow,
}

/// `next`/`prev` link a chained group into its circular chain, or a free
/// group into the circular free list. A root's `prev` is its chain's tail.
#[derive(Clone, Debug)]
pub(crate) struct Group<T> {
    pub state: GroupState,
    pub next: usize,
    pub prev: usize,
    pub buckets: [Bucket<T>; GSIZE],
}

impl<T> Group<T> {
    pub fn unknown(index: usize) -> Self {
        Group {
            state: GroupState::Unknown,
            next: index,
            prev: index,
            buckets: std::array::from_fn(|_| None),
        }
    }

    #[inline]
    pub fn is_chained(&self) -> bool {
        matches!(self.state, GroupState::Root | GroupState::Overflow)
    }

    /// Buckets fill front to back, so the first slot decides.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets[0].is_none()
    }

    pub fn occupied(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }

    pub fn take_buckets(&mut self) -> [Bucket<T>; GSIZE] {
        core::mem::replace(&mut self.buckets, std::array::from_fn(|_| None))
    }
}
