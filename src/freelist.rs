use std::ptr::NonNull;

use crate::Pointer;

/// When a block is freed we reuse its content to store a single link to the
/// next free block of the same size class. Every class is at least 16 bytes,
/// so the link always fits:
///
/// ```text
/// +----------------------------+
/// | pointer to next free block | <- FreeBlock
/// +----------------------------+
/// |     stale user data        |
/// |          ......            |
/// +----------------------------+
/// ```
///
/// The block is only written after the caller has handed it back to us, and
/// it is only given out again after it has been popped, so the link never
/// overlaps live user data.
pub(crate) struct FreeBlock {
    pub next: Pointer<FreeBlock>,
}

/// Intrusive LIFO stack of free blocks. The most recently freed block is the
/// first one reused, which keeps hot memory hot.
///
/// ```text
///  top
///   |
///   v
/// +------+     +------+     +------+
/// | Free | --> | Free | --> | Free | --> None
/// +------+     +------+     +------+
/// ```
///
/// Blocks on the stack may live in any page of the class, there is no
/// ordering by address.
pub(crate) struct FreeStack {
    pub top: Pointer<FreeBlock>,
    pub len: usize,
}

impl FreeStack {
    pub const fn new() -> Self {
        Self { top: None, len: 0 }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Returns `true` if `block` is the block that was freed last.
    #[inline]
    pub fn is_top(&self, block: NonNull<u8>) -> bool {
        self.top.is_some_and(|top| top.cast() == block)
    }

    /// Pushes `block` on top of the stack.
    ///
    /// # Safety
    ///
    /// `block` must point to at least one pointer worth of writable memory,
    /// aligned to a pointer, that nobody else is using anymore.
    pub unsafe fn push(&mut self, block: NonNull<u8>) {
        let node = block.cast::<FreeBlock>();
        node.as_ptr().write(FreeBlock { next: self.top });
        self.top = Some(node);
        self.len += 1;
    }

    /// Pops the most recently pushed block.
    pub unsafe fn pop(&mut self) -> Pointer<u8> {
        let node = self.top?;
        self.top = node.as_ref().next;
        self.len -= 1;

        Some(node.cast())
    }
}
