//! Integration tests for the allocator crate
//!
//! Exercises the public API the way a program linking against the allocator
//! would: raw sizes in, raw pointers out.

use std::{alloc::GlobalAlloc, alloc::Layout, collections::HashSet, ptr};

use slabloc::{classify, AllocError, SizeClass, Slabloc, PAGE_SIZE};

#[test]
fn test_usable_size_matches_class() {
    let allocator = Slabloc::new();

    let sizes = [0, 1, 15, 16, 17, 32, 33, 64, 65, 128, 129, 256, 257, 512, 513, 1024, 1025, 2048];

    unsafe {
        for size in sizes {
            let address = allocator.allocate(size);
            assert!(!address.is_null());

            let expected = classify(size).unwrap().size();
            assert_eq!(allocator.usable_size(address), expected);
            assert!(allocator.usable_size(address) >= size);

            // Natural alignment.
            assert_eq!(address as usize % expected, 0);

            // Whole block is writable.
            address.write_bytes(0xEE, expected);

            allocator.free(address);
        }
    }
}

#[test]
fn test_free_then_allocate_same_class() {
    let allocator = Slabloc::new();

    unsafe {
        let first = allocator.allocate(200);
        let second = allocator.allocate(256);
        assert_ne!(first, second);

        allocator.free(first);

        // Any size in the 256 class gets the freed block back.
        assert_eq!(allocator.allocate(129), first);

        // Different class, different block.
        allocator.free(second);
        let other = allocator.allocate(100);
        assert_ne!(other, second);
        assert_eq!(allocator.usable_size(other), 128);
    }
}

#[test]
fn test_large_object_path() {
    let allocator = Slabloc::new();

    unsafe {
        let address = allocator.allocate(3000);
        assert!(!address.is_null());
        assert_eq!(address as usize % PAGE_SIZE, 0);
        assert!(allocator.usable_size(address) >= 3000);

        address.write_bytes(1, 3000);

        // No header anywhere inside the object.
        for offset in [1, 8, 100, 2999] {
            assert_eq!(allocator.usable_size(address.add(offset)), 1);
        }

        // Spans multiple pages.
        let big = allocator.allocate(PAGE_SIZE * 5 + 1);
        assert_eq!(big as usize % PAGE_SIZE, 0);
        assert!(allocator.usable_size(big) >= PAGE_SIZE * 5 + 1);
        big.write_bytes(2, PAGE_SIZE * 5 + 1);
        assert_eq!(allocator.usable_size(big.add(PAGE_SIZE)), 1);

        allocator.free(address);
        allocator.free(big);

        // Once released, the allocator no longer knows the pointer.
        let again = allocator.allocate(3000);
        assert!(!again.is_null());
        allocator.free(again);
    }
}

#[test]
fn test_null_safety() {
    let allocator = Slabloc::new();

    unsafe {
        allocator.free(ptr::null_mut());
        assert_eq!(allocator.usable_size(ptr::null()), 1);
    }
}

#[test]
fn test_foreign_pointers_are_ignored() {
    static GLOBAL: [u64; 8] = [0; 8];

    let allocator = Slabloc::new();
    let mut local = [7u8; 32];

    unsafe {
        let block = allocator.allocate(48);
        allocator.free(block);

        allocator.free(local.as_mut_ptr());
        allocator.free(GLOBAL.as_ptr().cast_mut().cast());

        assert_eq!(allocator.usable_size(local.as_ptr()), 1);
        assert_eq!(allocator.usable_size(GLOBAL.as_ptr().cast()), 1);

        // Only the real block was recorded as free.
        assert_eq!(allocator.allocate(64), block);
        assert_ne!(allocator.allocate(64), block);
    }

    assert_eq!(local, [7; 32]);
}

#[test]
fn test_freed_large_object_is_forgotten() {
    let allocator = Slabloc::new();

    unsafe {
        let large = allocator.allocate(3000);
        assert!(!large.is_null());

        allocator.free(large);
        allocator.free(large);
        assert_eq!(allocator.usable_size(large), 1);

        let larger = allocator.allocate(5000);
        allocator.free(larger);
        assert_eq!(allocator.usable_size(larger), 1);
    }
}

#[test]
fn test_page_exhaustion_keeps_old_blocks() {
    let allocator = Slabloc::new();

    unsafe {
        // More 1024 byte blocks than a single page can hold.
        let count = PAGE_SIZE / 1024 * 3;
        let blocks: Vec<*mut u8> = (0..count).map(|_| allocator.allocate(1024)).collect();

        for (i, block) in blocks.iter().enumerate() {
            assert!(!block.is_null());
            block.write_bytes(i as u8, 1024);
        }

        let unique: HashSet<usize> = blocks.iter().map(|b| *b as usize).collect();
        assert_eq!(unique.len(), count);

        for (i, block) in blocks.iter().enumerate() {
            let bytes = std::slice::from_raw_parts(*block, 1024);
            assert!(bytes.iter().all(|byte| *byte == i as u8));
            assert_eq!(allocator.usable_size(*block), 1024);
        }
    }
}

#[test]
fn test_end_to_end_hundred_objects() {
    let allocator = Slabloc::new();

    unsafe {
        let first: Vec<usize> = (0..100)
            .map(|_| allocator.allocate(20) as usize)
            .collect();

        let mut sorted = first.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
        for pair in sorted.windows(2) {
            assert!(pair[1] - pair[0] >= 32);
        }

        for address in &first {
            allocator.free(*address as *mut u8);
        }

        let freed: HashSet<usize> = first.into_iter().collect();
        let second: HashSet<usize> = (0..100)
            .map(|_| allocator.allocate(20) as usize)
            .collect();

        assert_eq!(second, freed);
    }
}

#[test]
fn test_registry_full_is_reported() {
    let allocator = Slabloc::<3>::with_slots();

    assert!(allocator.try_allocate(16).is_ok());
    assert!(allocator.try_allocate(32).is_ok());
    assert!(allocator.try_allocate(64).is_ok());

    assert_eq!(allocator.try_allocate(128), Err(AllocError::RegistryFull));
    assert!(allocator.allocate(2048).is_null());

    // Large objects don't need a slot.
    assert!(allocator.try_allocate(SizeClass::MAX_SIZE + 1).is_ok());
}

#[test]
fn test_oversized_request_fails_cleanly() {
    let allocator = Slabloc::new();

    assert_eq!(allocator.try_allocate(usize::MAX), Err(AllocError::NoMemory));
    assert!(allocator.allocate(usize::MAX - 1).is_null());
}

#[test]
fn test_global_alloc_interface() {
    let allocator = Slabloc::new();

    unsafe {
        let layout = Layout::array::<u64>(300).unwrap();
        let address = allocator.alloc_zeroed(layout).cast::<u64>();
        assert!(!address.is_null());

        for i in 0..300 {
            assert_eq!(*address.add(i), 0);
            *address.add(i) = i as u64;
        }

        let grown = allocator
            .realloc(address.cast(), layout, layout.size() * 4)
            .cast::<u64>();
        for i in 0..300 {
            assert_eq!(*grown.add(i), i as u64);
        }

        allocator.dealloc(grown.cast(), Layout::array::<u64>(1200).unwrap());
    }
}

#[test]
fn test_independent_instances() {
    let first = Slabloc::new();
    let second = Slabloc::new();

    unsafe {
        let a = first.allocate(64);
        let b = second.allocate(64);
        assert_ne!(a, b);

        // Handing a block to the wrong instance changes nothing there.
        assert_eq!(second.usable_size(a), 1);
        second.free(a);
        assert_ne!(second.allocate(64), a);

        first.free(a);
        assert_eq!(first.allocate(64), a);
        assert_ne!(second.allocate(64), a);
    }

    // Dropping gives everything back to the kernel.
    drop(first);
    drop(second);
}
