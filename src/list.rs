use std::{marker::PhantomData, ptr::NonNull};

use crate::Pointer;

/// Linked list node. The payload comes first and the layout is fixed so that
/// slab headers can promise their tag and size class at the very start of a
/// page, see [`crate::header`].
#[repr(C)]
pub(crate) struct Node<T> {
    pub data: T,
    pub next: Pointer<Self>,
    pub prev: Pointer<Self>,
}

/// Intrusive doubly linked list. Nodes are written into memory that we got
/// from the kernel ourselves (slab page headers, tails of large mappings),
/// so the list itself never allocates. We are the allocator, after all.
pub(crate) struct LinkedList<T> {
    pub head: Pointer<Node<T>>,
    pub tail: Pointer<Node<T>>,
    pub len: usize,
    marker: PhantomData<T>,
}

impl<T> LinkedList<T> {
    /// Creates an empty linked list.
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    /// Number of nodes currently linked.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// First node, if any.
    #[inline]
    pub fn first(&self) -> Pointer<Node<T>> {
        self.head
    }

    /// Appends a new node holding `data`. Since it cannot allocate, it needs
    /// the address where the node should be written to.
    ///
    /// # Safety
    ///
    /// `address` must be valid for writes of a [`Node<T>`], suitably aligned,
    /// and must stay valid until the node is removed.
    pub unsafe fn append(&mut self, data: T, address: NonNull<u8>) -> NonNull<Node<T>> {
        let node = address.cast::<Node<T>>();

        node.as_ptr().write(Node {
            data,
            next: None,
            prev: self.tail,
        });

        match self.tail {
            Some(mut tail) => tail.as_mut().next = Some(node),
            None => self.head = Some(node),
        }

        self.tail = Some(node);
        self.len += 1;

        node
    }

    /// Unlinks `node` from the list. The memory of the node is left untouched
    /// except for its links, so the caller can still read `data` afterwards.
    ///
    /// # Safety
    ///
    /// `node` must be valid and currently linked into this list.
    pub unsafe fn remove(&mut self, mut node: NonNull<Node<T>>) {
        let prev = node.as_ref().prev;
        let next = node.as_ref().next;

        match prev {
            Some(mut prev) => prev.as_mut().next = next,
            None => self.head = next,
        }

        match next {
            Some(mut next) => next.as_mut().prev = prev,
            None => self.tail = prev,
        }

        node.as_mut().next = None;
        node.as_mut().prev = None;
        self.len -= 1;
    }

    /// Iterates over the nodes from head to tail. Nodes must not be removed
    /// or unmapped while iterating.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }
}

/// See [`LinkedList::iter`].
pub(crate) struct Iter<'a, T> {
    current: Pointer<Node<T>>,
    marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.current.map(|node| unsafe {
            self.current = node.as_ref().next;
            node
        })
    }
}
