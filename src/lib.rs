//! Slabloc
//!
//! A small general purpose allocator that talks directly to the kernel:
//! - Power of two size classes from 16 to 2048 bytes, one free list each
//! - Slab pages tagged with their size class so any pointer can be resolved
//! - Dedicated mappings for objects larger than half a page
//! - Optional C entry points (`ffi` feature) and [`std::alloc::GlobalAlloc`]
//!
//! See [`Slabloc`] for the public API.

use std::{fmt, ptr::NonNull};

// Logging goes through the `log` facade only when the feature is enabled.
// Otherwise these stand-ins type check the arguments and emit nothing.
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}
#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

mod align;
mod allocator;
mod bucket;
#[cfg(feature = "ffi")]
pub mod ffi;
mod freelist;
mod header;
mod large;
mod list;
mod platform;
mod size_class;

/// Non-null pointer to `T`. We use this in most cases instead of `*mut T`
/// because the compiler will yell at us if we don't write code for the `None`
/// case.
pub(crate) type Pointer<T> = Option<NonNull<T>>;

/// Reasons why an allocation request could not be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The kernel refused to map more memory, or the request is so large that
    /// it can't be rounded to a whole number of pages.
    NoMemory,
    /// Every registry slot already serves some other size class.
    RegistryFull,
    /// The request can't be satisfied by this allocator, for example an
    /// alignment larger than [`PAGE_SIZE`].
    InvalidParam,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::NoMemory => f.write_str("out of memory"),
            AllocError::RegistryFull => f.write_str("no free registry slot for size class"),
            AllocError::InvalidParam => f.write_str("unsupported allocation request"),
        }
    }
}

impl std::error::Error for AllocError {}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

pub use allocator::Slabloc;
pub use platform::PAGE_SIZE;
pub use size_class::{classify, SizeClass};
