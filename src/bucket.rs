use std::ptr::NonNull;

#[cfg(feature = "log")]
use log::{debug, warn};

use crate::{
    freelist::FreeStack,
    header::{blocks_per_page, Slab, SlabHeader},
    list::LinkedList,
    platform::{self, PAGE_SIZE},
    size_class::SizeClass,
    AllocError, AllocResult, Pointer,
};

/// One registry entry. A bucket serves exactly one [`SizeClass`] once it has
/// been claimed, and owns every page it ever requested for that class:
///
/// ```text
///                   free_blocks.top
///                         |
///            +------------|---------------+      +----------------------------------+
///            |            v               |      |                                  |
/// pages ->   | Header | Free | Used | ... | ---> | Header | Used | Used | .. |      |
///            |                            |      |                        ^    ^    |
///            +----------------------------+      +------------------------|----|----+
///                                                                      cursor  end
/// ```
///
/// Blocks are handed out from the free stack first. When it's empty we bump
/// the cursor through the newest page, and when the newest page is exhausted
/// we ask the kernel for another one. Pages are never given back while the
/// bucket is alive, they're unmapped when it drops.
pub(crate) struct Bucket {
    /// Class served by this bucket. `None` marks an unused registry slot.
    pub class: Option<SizeClass>,
    /// Blocks that were freed and can be reused.
    pub free_blocks: FreeStack,
    /// Every page mapped for this class, oldest first. The nodes of this list
    /// are the slab headers themselves.
    pub pages: LinkedList<Slab>,
    /// Next never allocated block in the newest page.
    cursor: Pointer<u8>,
    /// End of the newest page.
    end: Pointer<u8>,
}

// SAFETY: The bucket exclusively owns its pages, raw pointers inside it are
// never shared with anything else.
unsafe impl Send for Bucket {}

impl Bucket {
    /// Builds an unused slot. No memory is mapped until the slot is claimed
    /// and the first block is requested.
    pub const fn new() -> Self {
        Self {
            class: None,
            free_blocks: FreeStack::new(),
            pages: LinkedList::new(),
            cursor: None,
            end: None,
        }
    }

    /// Assigns this slot to `class`.
    pub fn claim(&mut self, class: SizeClass) {
        debug_assert!(self.class.is_none());
        self.class = Some(class);
    }

    /// Class size in bytes, or 0 if the slot is unused.
    #[cfg(test)]
    pub fn class_size(&self) -> usize {
        self.class.map_or(0, |class| class.size())
    }

    /// Returns a block of this bucket's class. Pops the free stack if
    /// possible, otherwise bumps the cursor, mapping a new page first if the
    /// current one has no room left.
    pub unsafe fn allocate(&mut self) -> AllocResult<NonNull<u8>> {
        let Some(class) = self.class else {
            return Err(AllocError::InvalidParam);
        };

        if let Some(block) = self.free_blocks.pop() {
            return Ok(block);
        }

        if let Some(block) = self.bump(class) {
            return Ok(block);
        }

        self.request_page(class)?;
        debug_assert!(blocks_per_page(class) >= 1);

        self.bump(class).ok_or(AllocError::NoMemory)
    }

    /// Gives `block` back to this bucket. `block` must be the start of a block
    /// previously returned by [`Self::allocate`].
    pub unsafe fn deallocate(&mut self, block: NonNull<u8>) {
        if self.free_blocks.is_top(block) {
            warn!(
                "double free of block {block:?} ignored ({} free blocks in class)",
                self.free_blocks.len
            );
            return;
        }

        self.free_blocks.push(block);
    }

    /// Returns `true` if `page` is one of the pages mapped by this bucket.
    /// The list nodes are the page headers, so this only compares addresses
    /// and never reads `page` itself.
    pub fn owns_page(&self, page: NonNull<u8>) -> bool {
        self.pages.iter().any(|header| header.cast::<u8>() == page)
    }

    /// Number of pages mapped for this bucket so far.
    #[cfg(test)]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Carves the next block out of the newest page if it fits.
    fn bump(&mut self, class: SizeClass) -> Pointer<u8> {
        let (cursor, end) = (self.cursor?, self.end?);

        if end.as_ptr() as usize - (cursor.as_ptr() as usize) < class.size() {
            return None;
        }

        // SAFETY: The block fits before `end`, so the new cursor is at most
        // one past the end of the page.
        self.cursor = Some(unsafe { cursor.add(class.size()) });

        Some(cursor)
    }

    /// Maps a new page, writes its slab header and moves the cursor there.
    unsafe fn request_page(&mut self, class: SizeClass) -> AllocResult {
        let Some(address) = platform::request_memory(PAGE_SIZE) else {
            warn!("kernel refused a page for size class {}", class.size());
            return Err(AllocError::NoMemory);
        };

        let header = self.pages.append(SlabHeader::slab(class), address);

        self.cursor = Some(SlabHeader::data_start(header, class));
        self.end = Some(SlabHeader::page_end(header));

        debug!(
            "mapped page {:?} for size class {} ({} pages)",
            address,
            class.size(),
            self.pages.len()
        );

        Ok(())
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        // Unlink before unmapping, the links live inside the page.
        while let Some(page) = self.pages.first() {
            unsafe {
                self.pages.remove(page);
                platform::return_memory(page.cast(), PAGE_SIZE);
            }
        }
    }
}
