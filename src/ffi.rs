//! C entry points. Build the crate as a `cdylib` with the `ffi` feature and
//! link C programs against these symbols in place of `malloc`, `free` and
//! `malloc_usable_size`:
//!
//! ```c
//! void  *slabloc_malloc(size_t size);
//! void   slabloc_free(void *ptr);
//! size_t slabloc_usable_size(void *ptr);
//! ```
//!
//! All three share one process wide [`Slabloc`] instance.

use std::ffi::c_void;

use crate::Slabloc;

static ALLOCATOR: Slabloc = Slabloc::new();

/// Allocates at least `size` bytes. Returns null if the kernel refuses to
/// give us more memory.
#[no_mangle]
pub extern "C" fn slabloc_malloc(size: usize) -> *mut c_void {
    ALLOCATOR.allocate(size).cast()
}

/// Frees memory returned by [`slabloc_malloc`]. Null and unknown pointers are
/// ignored.
///
/// # Safety
///
/// See [`Slabloc::free`].
#[no_mangle]
pub unsafe extern "C" fn slabloc_free(ptr: *mut c_void) {
    ALLOCATOR.free(ptr.cast())
}

/// Usable bytes at `ptr`, 1 for null and unknown pointers.
///
/// # Safety
///
/// See [`Slabloc::usable_size`].
#[no_mangle]
pub unsafe extern "C" fn slabloc_usable_size(ptr: *mut c_void) -> usize {
    ALLOCATOR.usable_size(ptr.cast_const().cast())
}
