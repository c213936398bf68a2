use std::{mem, ptr::NonNull};

#[cfg(feature = "log")]
use log::{debug, warn};

use crate::{
    align::align_up,
    list::{LinkedList, Node},
    platform::{self, PAGE_SIZE},
    AllocError, AllocResult, Pointer,
};

/// Record of one large object. Large objects don't carry a slab header, the
/// address we return is the first byte of the mapping and it belongs to the
/// caller. Instead, the record is written at the very end of the mapping,
/// where the caller was told not to write, and linked into
/// [`LargeObjects`]:
///
/// ```text
/// +-----------------------------+  <- base (returned to the caller)
/// |                             |
/// |         User content        |  usable = length - LARGE_RECORD_SIZE
/// |                             |
/// +-----------------------------+
/// |   Node<LargeObject> record  |
/// +-----------------------------+  <- base + length
/// ```
///
/// This way [`crate::Slabloc::free`] can tell a large object apart from a
/// foreign pointer and give the mapping back to the kernel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LargeObject {
    /// Start of the mapping.
    pub base: NonNull<u8>,
    /// Length of the mapping, including the record.
    pub length: usize,
}

impl LargeObject {
    /// Bytes the caller can use.
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.length - LARGE_RECORD_SIZE
    }
}

/// Size of the record stored at the tail of every large mapping.
pub(crate) const LARGE_RECORD_SIZE: usize = mem::size_of::<Node<LargeObject>>();

/// Requests above this many bytes bypass the size classes.
pub(crate) const LARGE_THRESHOLD: usize = PAGE_SIZE / 2;

/// Returns `true` if `size` must go through the large object path.
#[inline]
pub(crate) fn is_large(size: usize) -> bool {
    size > LARGE_THRESHOLD
}

/// Calculates the length that we should map to store at least `size` bytes
/// plus the trailing record, rounded up to a whole number of pages. If we
/// want 4100 bytes and the page size is 4096, we map 2 pages (8192 bytes).
/// Returns `None` if the length doesn't fit in a `usize`.
pub(crate) fn determine_mapping_length(size: usize) -> Option<usize> {
    align_up(size.checked_add(LARGE_RECORD_SIZE)?, PAGE_SIZE)
}

/// All live large objects of one allocator instance.
pub(crate) struct LargeObjects {
    objects: LinkedList<LargeObject>,
}

// SAFETY: Same reasoning as for `Bucket`, the mappings are exclusively ours
// until freed.
unsafe impl Send for LargeObjects {}

impl LargeObjects {
    pub const fn new() -> Self {
        Self {
            objects: LinkedList::new(),
        }
    }

    /// Number of live large objects.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Maps a dedicated region that can hold `size` bytes. The returned
    /// address is page aligned.
    pub unsafe fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        debug_assert!(is_large(size));

        let length = determine_mapping_length(size).ok_or(AllocError::NoMemory)?;

        let Some(base) = platform::request_memory(length) else {
            warn!("kernel refused {length} bytes for a large object");
            return Err(AllocError::NoMemory);
        };

        self.objects
            .append(LargeObject { base, length }, base.add(length - LARGE_RECORD_SIZE));

        debug!("mapped large object of {length} bytes at {base:?}");

        Ok(base)
    }

    /// Finds the record of the large object that starts exactly at `address`.
    /// Interior pointers are not recognized.
    pub fn find(&self, address: NonNull<u8>) -> Pointer<Node<LargeObject>> {
        // Large objects are always page aligned.
        if address.as_ptr() as usize % PAGE_SIZE != 0 {
            return None;
        }

        self.objects
            .iter()
            .find(|node| unsafe { node.as_ref().data.base == address })
    }

    /// Usable size of the large object starting at `address`, if it's one of
    /// ours.
    pub fn usable_size(&self, address: NonNull<u8>) -> Option<usize> {
        self.find(address)
            .map(|node| unsafe { node.as_ref().data.usable_size() })
    }

    /// Unmaps the large object starting at `address`. Returns `false` and
    /// does nothing if `address` is not the start of one of our large
    /// objects.
    pub unsafe fn deallocate(&mut self, address: NonNull<u8>) -> bool {
        let Some(node) = self.find(address) else {
            return false;
        };

        // The record lives inside the mapping, copy it out before unmapping.
        let LargeObject { base, length } = node.as_ref().data;
        self.objects.remove(node);
        platform::return_memory(base, length);

        debug!("unmapped large object of {length} bytes at {base:?}");

        true
    }
}

impl Drop for LargeObjects {
    fn drop(&mut self) {
        while let Some(node) = self.objects.first() {
            unsafe {
                let LargeObject { base, length } = node.as_ref().data;
                self.objects.remove(node);
                platform::return_memory(base, length);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size_class::SizeClass;

    #[test]
    fn mapping_length() {
        // Basic checks.
        assert_eq!(determine_mapping_length(LARGE_THRESHOLD + 1), Some(PAGE_SIZE));
        assert_eq!(determine_mapping_length(3000), Some(PAGE_SIZE));
        assert_eq!(
            determine_mapping_length(PAGE_SIZE - LARGE_RECORD_SIZE),
            Some(PAGE_SIZE)
        );

        // The record pushes exact page multiples into one more page.
        for i in 1..=100 {
            assert_eq!(determine_mapping_length(PAGE_SIZE * i), Some(PAGE_SIZE * (i + 1)));
        }

        assert_eq!(determine_mapping_length(usize::MAX), None);
        assert_eq!(determine_mapping_length(usize::MAX - PAGE_SIZE), None);
    }

    #[test]
    fn threshold() {
        assert!(!is_large(SizeClass::MAX_SIZE));
        assert!(is_large(SizeClass::MAX_SIZE + 1));
        assert_eq!(LARGE_THRESHOLD, SizeClass::MAX_SIZE);
    }

    #[test]
    fn allocate_find_deallocate() {
        unsafe {
            let mut large = LargeObjects::new();

            let first = large.allocate(3000).unwrap();
            let second = large.allocate(PAGE_SIZE * 3).unwrap();
            assert_eq!(large.len(), 2);

            for address in [first, second] {
                assert_eq!(address.as_ptr() as usize % PAGE_SIZE, 0);
            }

            assert_eq!(large.usable_size(first), Some(PAGE_SIZE - LARGE_RECORD_SIZE));
            assert_eq!(
                large.usable_size(second),
                Some(PAGE_SIZE * 4 - LARGE_RECORD_SIZE)
            );

            // Whole usable area can be written without touching the record.
            first.as_ptr().write_bytes(42, 3000);
            second.as_ptr().write_bytes(7, PAGE_SIZE * 4 - LARGE_RECORD_SIZE);
            assert_eq!(large.usable_size(first), Some(PAGE_SIZE - LARGE_RECORD_SIZE));

            // Interior pointers are not large objects.
            assert!(large.find(first.add(1)).is_none());
            assert!(large.find(second.add(PAGE_SIZE)).is_none());

            assert!(large.deallocate(first));
            assert_eq!(large.len(), 1);
            assert!(!large.deallocate(first));
            assert_eq!(*second.as_ptr(), 7);

            assert!(large.deallocate(second));
            assert_eq!(large.len(), 0);
        }
    }
}
