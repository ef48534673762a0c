//! The capability set the engine needs from stored values.
//!
//! Storing an element clones it (acquire) and removing or overwriting it
//! drops the stored copy (release). Shared ownership is the caller's
//! choice: `Rc<T>` elements make both points a reference-count change.

use crate::error::Unhashable;
use core::hash::{BuildHasher, Hasher};
use std::rc::Rc;

/// A value that can be stored as a key or value of a relation.
///
/// `element_hash` must be consistent with `Eq`: equal elements hash
/// equally under the same `BuildHasher`. Hashing may fail, in which case
/// the element can still be stored as a Dict/Graph value but never as a
/// key.
pub trait Element: Clone + Ord {
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable>;
}

/// Implements [`Element`] for types whose `std::hash::Hash` never fails.
#[macro_export]
macro_rules! impl_element_via_hash {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::Element for $t {
                #[inline]
                fn element_hash<S: ::core::hash::BuildHasher>(
                    &self,
                    build: &S,
                ) -> ::core::result::Result<u64, $crate::Unhashable> {
                    Ok(build.hash_one(self))
                }
            }
        )*
    };
}

impl_element_via_hash!(
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    bool,
    char,
    (),
    String,
    &'static str,
);

impl<T: Element> Element for Rc<T> {
    #[inline]
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable> {
        (**self).element_hash(build)
    }
}

impl<T: Element> Element for Box<T> {
    #[inline]
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable> {
        (**self).element_hash(build)
    }
}

impl<T: Element> Element for Option<T> {
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable> {
        let mut h = build.build_hasher();
        match self {
            None => h.write_u8(0),
            Some(v) => {
                h.write_u8(1);
                h.write_u64(v.element_hash(build)?);
            }
        }
        Ok(h.finish())
    }
}

impl<T: Element> Element for Vec<T> {
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable> {
        let mut h = build.build_hasher();
        h.write_usize(self.len());
        for v in self {
            h.write_u64(v.element_hash(build)?);
        }
        Ok(h.finish())
    }
}

impl<A: Element, B: Element> Element for (A, B) {
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable> {
        let mut h = build.build_hasher();
        h.write_u64(self.0.element_hash(build)?);
        h.write_u64(self.1.element_hash(build)?);
        Ok(h.finish())
    }
}

impl<A: Element, B: Element, C: Element> Element for (A, B, C) {
    fn element_hash<S: BuildHasher>(&self, build: &S) -> Result<u64, Unhashable> {
        let mut h = build.build_hasher();
        h.write_u64(self.0.element_hash(build)?);
        h.write_u64(self.1.element_hash(build)?);
        h.write_u64(self.2.element_hash(build)?);
        Ok(h.finish())
    }
}
