use std::ptr::NonNull;

use crate::Pointer;

/// Size in bytes of every slab page and the granularity of large mappings.
/// Slab headers are found by masking an address down to a multiple of this
/// value, so it must never exceed the alignment the kernel gives to fresh
/// mappings (4096 on every platform we support, 64K on Windows).
pub const PAGE_SIZE: usize = 4096;

/// Abstraction for platform specific memory handling. The allocator only needs
/// to request pages of memory and, on teardown or large object release, give
/// them back. It doesn't care about the APIs offered by the underlying kernel
/// or libraries.
trait PlatformSpecificMemory {
    /// Requests a zero filled memory region from the kernel where `length`
    /// bytes can be written safely. `length` must be a multiple of
    /// [`PAGE_SIZE`].
    unsafe fn request_memory(length: usize) -> Pointer<u8>;

    /// Attempts to return `length` bytes starting from `address` to the
    /// underlying kernel. `address` and `length` must describe exactly one
    /// region previously obtained from [`Self::request_memory`].
    unsafe fn return_memory(address: NonNull<u8>, length: usize);
}

/// Zero sized type that implements [`PlatformSpecificMemory`] for each OS.
pub(crate) struct Platform;

/// Convinience wrapper for [`PlatformSpecificMemory::request_memory`].
#[inline]
pub(crate) unsafe fn request_memory(length: usize) -> Pointer<u8> {
    debug_assert_eq!(length % PAGE_SIZE, 0);
    Platform::request_memory(length)
}

/// Convinience wrapper for [`PlatformSpecificMemory::return_memory`].
#[inline]
pub(crate) unsafe fn return_memory(address: NonNull<u8>, length: usize) {
    Platform::return_memory(address, length)
}

#[cfg(unix)]
#[cfg(not(miri))]
mod unix {
    use std::ptr::{self, NonNull};

    #[cfg(feature = "log")]
    use log::error;

    use super::{Platform, PlatformSpecificMemory};
    use crate::Pointer;

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Pointer<u8> {
            // Memory protection. Read-Write only.
            let protection = libc::PROT_READ | libc::PROT_WRITE;

            // Private to our process and not backed by any file, which also
            // means the kernel hands it out zero filled.
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

            match libc::mmap(ptr::null_mut(), length, protection, flags, -1, 0) {
                libc::MAP_FAILED => None,
                address => NonNull::new(address.cast()),
            }
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            if libc::munmap(address.as_ptr().cast(), length) != 0 {
                // Nothing sensible to do, the region stays mapped and we've
                // already forgotten about it.
                error!("munmap failed for {length} bytes at {address:?}");
            }
        }
    }
}

#[cfg(windows)]
#[cfg(not(miri))]
mod windows {
    use std::ptr::NonNull;

    #[cfg(feature = "log")]
    use log::error;
    use windows::Win32::System::Memory;

    use super::{Platform, PlatformSpecificMemory};
    use crate::Pointer;

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Pointer<u8> {
            // Similar to mmap on Linux, Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            // Memory has to be reserved first and then committed in order to
            // become usable. We can do both at the same time.
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            let address = Memory::VirtualAlloc(None, length, flags, protection);

            NonNull::new(address.cast())
        }

        unsafe fn return_memory(address: NonNull<u8>, _length: usize) {
            // MEM_RELEASE requires a length of 0 and releases the whole
            // reservation made by VirtualAlloc.
            let address = address.cast().as_ptr();
            let flags = Memory::MEM_RELEASE;

            if !Memory::VirtualFree(address, 0, flags).as_bool() {
                error!("VirtualFree failed at {address:?}");
            }
        }
    }
}

#[cfg(miri)]
mod miri {
    //! Miri has no FFI support, so `mmap` is mocked with the global allocator.
    //! This also lets Miri report pages that we never give back.

    use std::{alloc, ptr::NonNull};

    use super::{Platform, PlatformSpecificMemory, PAGE_SIZE};
    use crate::Pointer;

    impl PlatformSpecificMemory for Platform {
        unsafe fn request_memory(length: usize) -> Pointer<u8> {
            match alloc::Layout::from_size_align(length, PAGE_SIZE) {
                Ok(layout) => NonNull::new(alloc::alloc_zeroed(layout)),
                Err(_) => None,
            }
        }

        unsafe fn return_memory(address: NonNull<u8>, length: usize) {
            if let Ok(layout) = alloc::Layout::from_size_align(length, PAGE_SIZE) {
                alloc::dealloc(address.as_ptr(), layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_aligned_and_zeroed() {
        unsafe {
            let lengths = [PAGE_SIZE, PAGE_SIZE * 3];

            for length in lengths {
                let address = request_memory(length).unwrap();
                assert_eq!(address.as_ptr() as usize % PAGE_SIZE, 0);

                let bytes = std::slice::from_raw_parts_mut(address.as_ptr(), length);
                assert!(bytes.iter().all(|byte| *byte == 0));

                // Whole region must be writable.
                bytes.fill(0xAB);
                assert_eq!(bytes[length - 1], 0xAB);

                return_memory(address, length);
            }
        }
    }
}
