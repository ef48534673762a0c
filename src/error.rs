//! Error kinds reported by the table engine and the relation facade.

use crate::behavior::Behavior;
use core::fmt;
use std::collections::TryReserveError;

/// Marker returned by [`Element::element_hash`](crate::Element::element_hash)
/// when a value has no usable hash.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Unhashable;

impl fmt::Display for Unhashable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("element is unhashable")
    }
}

impl std::error::Error for Unhashable {}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Unforced lookup or delete found no matching entry.
    KeyNotFound,
    /// An element's hash could not be computed.
    Unhashable,
    /// The operation is not defined for the relation's behavior.
    IncompatibleBehavior {
        op: &'static str,
        behavior: Behavior,
    },
    /// Mutation after the structural hash was memoized.
    ImmutableViolation,
    /// The group array could not be allocated.
    AllocationFailure,
    /// Malformed input to a batch constructor or lookup.
    InvalidArgument(&'static str),
    /// Free-list or chain corruption. Never recovered from.
    InternalInvariantViolation(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn incompatible(op: &'static str, behavior: Behavior) -> Self {
        Error::IncompatibleBehavior { op, behavior }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyNotFound => f.write_str("key not found"),
            Error::Unhashable => f.write_str("element is unhashable"),
            Error::IncompatibleBehavior { op, behavior } => {
                write!(f, "{op} is not defined for {behavior}")
            }
            Error::ImmutableViolation => {
                f.write_str("relation has been hashed, it is now immutable")
            }
            Error::AllocationFailure => f.write_str("unable to allocate table groups"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::InternalInvariantViolation(msg) => {
                write!(f, "internal table invariant violated: {msg}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<Unhashable> for Error {
    fn from(_: Unhashable) -> Self {
        Error::Unhashable
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::AllocationFailure
    }
}
