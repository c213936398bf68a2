use std::{
    alloc::{GlobalAlloc, Layout},
    cmp,
    ptr::{self, NonNull},
    sync::Mutex,
};

#[cfg(feature = "log")]
use log::{info, trace, warn};

use crate::{
    align::align_down,
    bucket::Bucket,
    header::{data_offset, page_of, SlabHeader},
    large::LargeObjects,
    platform::PAGE_SIZE,
    size_class::{classify, SizeClass},
    AllocError, AllocResult,
};

/// Size reported for pointers that we don't recognize. Never 0, so callers
/// that divide by the usable size don't blow up on null or foreign pointers.
const UNKNOWN_SIZE: usize = 1;

/// This is the registry. It contains one [`Bucket`] per size class in use and
/// the list of live large objects. Once you've read [`crate::header`],
/// [`crate::freelist`], [`crate::bucket`] and [`crate::large`], this is where
/// the circle gets completed:
///
/// ```text
///               +--------+------------------------+      +--------+------------------------+
/// buckets[0] -> | Header | Free | Used | Used | .. | ---> | Header | Used | Free |          |  (32)
///               +--------+------------------------+      +--------+------------------------+
///
///               +--------+------------------------+
/// buckets[1] -> | Header | Used | Used |          |                                          (16)
///               +--------+------------------------+
///
/// ..............................................................................................
///
/// buckets[N-1] -> unused
///
///                 +------------------------+      +------------------------------------------+
/// large_objects ->|  User content | Record | ---> |              User content       | Record |
///                 +------------------------+      +------------------------------------------+
/// ```
///
/// Slots are claimed in the order size classes are first requested, so
/// `buckets[0]` is not necessarily the smallest class. This struct is not
/// thread safe and needs mutable borrows to operate, see [`Slabloc`] for the
/// public, synchronized API.
pub(crate) struct InternalAllocator<const N: usize> {
    /// Registry slots, claimed lazily.
    buckets: [Bucket; N],
    /// Objects larger than [`SizeClass::MAX_SIZE`].
    large_objects: LargeObjects,
}

impl<const N: usize> InternalAllocator<N> {
    /// Builds an allocator with `N` empty registry slots.
    pub const fn new() -> Self {
        const BUCKET: Bucket = Bucket::new();
        InternalAllocator::<N> {
            buckets: [BUCKET; N],
            large_objects: LargeObjects::new(),
        }
    }

    /// Returns the index of the slot that serves `class`, if any.
    fn bucket_index_of(&self, class: SizeClass) -> Option<usize> {
        self.buckets
            .iter()
            .position(|bucket| bucket.class == Some(class))
    }

    /// Returns the bucket that serves `class`, claiming the first unused slot
    /// if this is the first request of that class.
    fn dispatch(&mut self, class: SizeClass) -> AllocResult<&mut Bucket> {
        let index = match self.bucket_index_of(class) {
            Some(index) => index,
            None => {
                let Some(index) = self.buckets.iter().position(|b| b.class.is_none()) else {
                    warn!(
                        "all {N} registry slots in use, can't serve size class {}",
                        class.size()
                    );
                    return Err(AllocError::RegistryFull);
                };
                self.buckets[index].claim(class);
                info!("registry slot {index} now serves size class {}", class.size());
                index
            }
        };

        Ok(&mut self.buckets[index])
    }

    /// Returns an address where `size` bytes can be safely written.
    pub unsafe fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        match classify(size) {
            Some(class) => self.dispatch(class)?.allocate(),
            None => self.large_objects.allocate(size),
        }
    }

    /// Finds the bucket that mapped the page containing `address` and reads
    /// the class from its slab header. The page header is only read once we
    /// know the page is ours, so freed large objects, pages of other
    /// instances and foreign memory are never dereferenced.
    unsafe fn owner_of(&self, address: NonNull<u8>) -> Option<(usize, SizeClass)> {
        let page = page_of(address)?;
        let index = self.buckets.iter().position(|bucket| bucket.owns_page(page))?;
        let class = SlabHeader::read_class(address)?;

        (self.buckets[index].class == Some(class)).then_some((index, class))
    }

    /// Deallocates the block that contains `address`. Large objects are
    /// unmapped, small blocks go back to their bucket and anything else is
    /// silently ignored.
    pub unsafe fn deallocate(&mut self, address: NonNull<u8>) {
        if self.large_objects.deallocate(address) {
            return;
        }

        let Some((index, class)) = self.owner_of(address) else {
            trace!("ignoring free of {address:?}, not in any page of this allocator");
            return;
        };

        let Some(page) = page_of(address) else {
            return;
        };

        // Blocks start at a class aligned offset and never cross the page, so
        // rounding down to the class size gives the start of the block.
        let block = address.as_ptr().map_addr(|addr| align_down(addr, class.size()));
        let offset = block as usize - page.as_ptr() as usize;
        if offset < data_offset(class) {
            trace!("ignoring free of {address:?}, points into a slab header");
            return;
        }

        self.buckets[index].deallocate(NonNull::new_unchecked(block));
    }

    /// Number of bytes that can be written at `address`, or [`UNKNOWN_SIZE`]
    /// if we don't know the pointer.
    pub unsafe fn usable_size(&self, address: NonNull<u8>) -> usize {
        if let Some(size) = self.large_objects.usable_size(address) {
            return size;
        }

        self.owner_of(address)
            .map_or(UNKNOWN_SIZE, |(_, class)| class.size())
    }
}

/// Size class slab allocator. Small requests (up to [`SizeClass::MAX_SIZE`]
/// bytes) are rounded up to a power of two and served from per class pages,
/// larger ones get their own mapping. Every piece of memory comes straight
/// from the kernel, no other allocator is involved.
///
/// Each instance is independent and gives all its memory back to the kernel
/// when dropped. Pointers must be freed through the instance that returned
/// them.
///
/// # Examples
///
/// ## Standalone allocator
///
/// ```rust
/// use slabloc::Slabloc;
///
/// let slabloc = Slabloc::new();
///
/// let address = slabloc.allocate(20);
/// assert!(!address.is_null());
///
/// unsafe {
///     // Rounded up to the 32 byte class.
///     assert_eq!(slabloc.usable_size(address), 32);
///
///     slabloc.free(address);
///
///     // Freed blocks are reused first.
///     assert_eq!(slabloc.allocate(30), address);
/// }
/// ```
///
/// ## Global allocator
///
/// ```no_run
/// use slabloc::Slabloc;
///
/// #[global_allocator]
/// static ALLOCATOR: Slabloc = Slabloc::new();
///
/// fn main() {
///     let num = Box::new(5);
///     assert_eq!(*num, 5);
/// }
/// ```
pub struct Slabloc<const N: usize = { SizeClass::COUNT }> {
    /// One lock for the whole registry. Finer grained locking (one per
    /// bucket) would let different size classes proceed in parallel, but
    /// `free` has to read the slab header before it knows which bucket to
    /// lock.
    allocator: Mutex<InternalAllocator<N>>,
}

impl Slabloc {
    /// Builds an allocator with one registry slot per size class.
    pub const fn new() -> Self {
        Self::with_slots()
    }
}

impl<const N: usize> Slabloc<N> {
    /// Builds an allocator with `N` registry slots. With fewer slots than
    /// [`SizeClass::COUNT`], requests for a new class fail with
    /// [`AllocError::RegistryFull`] once every slot is taken.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use slabloc::{AllocError, Slabloc};
    ///
    /// let slabloc = Slabloc::<1>::with_slots();
    ///
    /// assert!(slabloc.try_allocate(16).is_ok());
    /// assert_eq!(slabloc.try_allocate(64), Err(AllocError::RegistryFull));
    /// ```
    pub const fn with_slots() -> Self {
        Self {
            allocator: Mutex::new(InternalAllocator::new()),
        }
    }

    /// Allocates at least `size` bytes. Sizes up to [`SizeClass::MAX_SIZE`]
    /// are aligned to their size class, larger ones to [`PAGE_SIZE`].
    pub fn try_allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        match self.allocator.lock() {
            Ok(mut allocator) => unsafe { allocator.allocate(size) },
            Err(_) => Err(AllocError::NoMemory),
        }
    }

    /// Same as [`Self::try_allocate`] but returns a null pointer on failure.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        match self.try_allocate(size) {
            Ok(address) => address.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    /// Frees the object that contains `address`. Null pointers and pointers
    /// that this allocator doesn't recognize are ignored.
    ///
    /// # Safety
    ///
    /// Pointers that don't belong to this instance, including freed large
    /// objects and blocks of other instances, are recognized without being
    /// dereferenced and ignored. Freeing the same small block twice corrupts
    /// its size class unless nothing else was freed in between, so `address`
    /// must not be a small block that was already freed and possibly handed
    /// out again.
    pub unsafe fn free(&self, address: *mut u8) {
        let Some(address) = NonNull::new(address) else {
            return;
        };

        if let Ok(mut allocator) = self.allocator.lock() {
            allocator.deallocate(address);
        }
    }

    /// Number of bytes available at `address`. Returns 1 for null and for
    /// pointers this allocator doesn't recognize, including pointers into
    /// the middle of a large object.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Self::free`].
    pub unsafe fn usable_size(&self, address: *const u8) -> usize {
        let Some(address) = NonNull::new(address.cast_mut()) else {
            return UNKNOWN_SIZE;
        };

        match self.allocator.lock() {
            Ok(allocator) => allocator.usable_size(address),
            Err(_) => UNKNOWN_SIZE,
        }
    }
}

impl Default for Slabloc {
    fn default() -> Self {
        Slabloc::new()
    }
}

/// Size we have to request so that the natural alignment of the block
/// satisfies `layout`. Small blocks are aligned to their class size, large
/// objects to the page.
fn size_for(layout: Layout) -> AllocResult<usize> {
    if layout.align() > PAGE_SIZE {
        return Err(AllocError::InvalidParam);
    }

    Ok(cmp::max(layout.size(), layout.align()))
}

unsafe impl<const N: usize> GlobalAlloc for Slabloc<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match size_for(layout) {
            Ok(size) => self.allocate(size),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, address: *mut u8, _layout: Layout) {
        self.free(address)
    }

    unsafe fn realloc(&self, address: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // Shrinking or growing within the block we already have.
        if new_size <= self.usable_size(address) {
            return address;
        }

        let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
            return ptr::null_mut();
        };

        let new_address = self.alloc(new_layout);
        if !new_address.is_null() {
            ptr::copy_nonoverlapping(address, new_address, cmp::min(layout.size(), new_size));
            self.free(address);
        }

        new_address
    }
}
