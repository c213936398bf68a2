//! Slab page headers. Every page that serves a size class starts with a
//! [`SlabHeader`], which lets us recover the size class of any pointer into
//! the page by masking the pointer down to the page boundary:
//!
//! ```text
//!         +----------------------------+  <- page start (PAGE_SIZE aligned)
//! word 0  | SLAB_MAGIC                 |  <---+
//!         +----------------------------+      |
//! word 1  | class size                 |      |
//!         +----------------------------+      | SlabHeader
//! word 2  | next page of this class    |      |
//!         +----------------------------+      |
//! word 3  | prev page of this class    |  <---+
//!         +----------------------------+
//!         | padding up to class size   |
//!         +----------------------------+  <- data start (class size aligned)
//!         | block 0                    |
//!         +----------------------------+
//!         | block 1                    |
//!         +----------------------------+
//!         |            ...             |
//!         +----------------------------+  <- page end
//! ```
//!
//! Words 2 and 3 are the links of the page ownership list kept by
//! [`crate::bucket::Bucket`], so the list of pages lives inside the pages.

use std::{mem, ptr::NonNull};

use crate::{
    align::{align_down, align_up},
    list::Node,
    platform::PAGE_SIZE,
    size_class::SizeClass,
    Pointer,
};

/// Tag stored in the first word of every slab page. Spells "SLAB".
pub(crate) const SLAB_MAGIC: usize = 0x534c_4142;

/// Slab specific data. Field order is part of the format.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slab {
    pub magic: usize,
    pub class_size: usize,
}

/// Complete header written at the start of a slab page.
pub(crate) type SlabHeader = Node<Slab>;

/// Slab header size in bytes.
pub(crate) const SLAB_HEADER_SIZE: usize = mem::size_of::<SlabHeader>();

/// Offset of the first block in a page of `class`. Blocks are aligned to
/// their own size, so the header is padded up to a multiple of it.
#[inline]
pub(crate) const fn data_offset(class: SizeClass) -> usize {
    match align_up(SLAB_HEADER_SIZE, class.size()) {
        Some(offset) => offset,
        None => PAGE_SIZE,
    }
}

/// Number of blocks of `class` that fit in a single page.
#[inline]
pub(crate) const fn blocks_per_page(class: SizeClass) -> usize {
    (PAGE_SIZE - data_offset(class)) / class.size()
}

/// Start of the page that contains `address`. `None` for addresses in the
/// zero page, where nothing can be mapped.
#[inline]
pub(crate) fn page_of(address: NonNull<u8>) -> Pointer<u8> {
    NonNull::new(address.as_ptr().map_addr(|addr| align_down(addr, PAGE_SIZE)))
}

impl SlabHeader {
    /// Builds the header data for a fresh page of `class`.
    #[inline]
    pub fn slab(class: SizeClass) -> Slab {
        Slab {
            magic: SLAB_MAGIC,
            class_size: class.size(),
        }
    }

    /// Reads the header of the page containing `address` and returns the
    /// class it serves, or `None` when the page doesn't carry a valid tag.
    ///
    /// # Safety
    ///
    /// The first two words of the page containing `address` must be readable.
    /// The allocator only calls this after checking that the page is one of
    /// its own mapped pages.
    pub unsafe fn read_class(address: NonNull<u8>) -> Option<SizeClass> {
        let slab = page_of(address)?.cast::<Slab>().as_ptr();

        if (*slab).magic != SLAB_MAGIC {
            return None;
        }

        SizeClass::from_size((*slab).class_size)
    }

    /// First block of the page that starts at `header`.
    #[inline]
    pub unsafe fn data_start(header: NonNull<Self>, class: SizeClass) -> NonNull<u8> {
        header.cast::<u8>().add(data_offset(class))
    }

    /// One past the last usable byte of the page that starts at `header`.
    #[inline]
    pub unsafe fn page_end(header: NonNull<Self>) -> NonNull<u8> {
        header.cast::<u8>().add(PAGE_SIZE)
    }
}
