//! Debug-only guard against re-entering a table from element callbacks.
//!
//! Element `Eq`/`Ord`/hash and `Drop` run while a table operation is in
//! flight. If one of them reaches back into the same table, the chain or
//! free list may be half-updated. Debug builds turn that into a panic at
//! the point of entry; release builds compile the guard away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Per-table depth counter. `RawTable` entry points and each keyed-scan
/// step hold `self.guard.enter()` while they touch groups.
#[derive(Debug)]
pub(crate) struct TableGuard {
    #[cfg(debug_assertions)]
    depth: Cell<u32>,
    // Tables are single-threaded; keep them !Send + !Sync.
    _single_thread: PhantomData<*mut ()>,
}

impl TableGuard {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            depth: Cell::new(0),
            _single_thread: PhantomData,
        }
    }

    /// Marks the table busy until the returned token drops.
    #[inline]
    pub(crate) fn enter(&self) -> Entered<'_> {
        #[cfg(debug_assertions)]
        {
            let d = self.depth.get();
            assert!(d == 0, "table re-entered from an element callback");
            self.depth.set(d + 1);
            Entered { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            Entered { _z: PhantomData }
        }
    }
}

// A cloned table starts idle regardless of the source's state.
impl Clone for TableGuard {
    fn clone(&self) -> Self {
        Self::new()
    }
}

pub(crate) struct Entered<'a> {
    #[cfg(debug_assertions)]
    owner: &'a TableGuard,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let d = self.owner.depth.get();
            debug_assert!(d > 0);
            self.owner.depth.set(d - 1);
        }
    }
}
