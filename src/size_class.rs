//! Size classes for small objects.

/// Power of two classes that every small request is rounded up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum SizeClass {
    Bytes16 = 16,
    Bytes32 = 32,
    Bytes64 = 64,
    Bytes128 = 128,
    Bytes256 = 256,
    Bytes512 = 512,
    Bytes1024 = 1024,
    Bytes2048 = 2048,
}

impl SizeClass {
    /// Number of distinct classes.
    pub const COUNT: usize = 8;

    /// Smallest amount of bytes ever handed out.
    pub const MIN_SIZE: usize = 16;

    /// Largest request served from a size class. Anything bigger goes through
    /// the large object path. Half a page, so blocks never straddle pages.
    pub const MAX_SIZE: usize = 2048;

    /// All classes in ascending order.
    pub const ALL: [SizeClass; Self::COUNT] = [
        SizeClass::Bytes16,
        SizeClass::Bytes32,
        SizeClass::Bytes64,
        SizeClass::Bytes128,
        SizeClass::Bytes256,
        SizeClass::Bytes512,
        SizeClass::Bytes1024,
        SizeClass::Bytes2048,
    ];

    /// Returns the class whose size is exactly `size`, if any. Used to
    /// validate class sizes read back from slab headers.
    pub fn from_size(size: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.size() == size)
    }

    /// Block size in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        *self as usize
    }
}

/// Returns the smallest class that can hold `size` bytes, or `None` if the
/// request is larger than [`SizeClass::MAX_SIZE`]. Zero byte requests get the
/// smallest class.
///
/// # Examples
///
/// ```rust
/// use slabloc::{classify, SizeClass};
///
/// assert_eq!(classify(0), Some(SizeClass::Bytes16));
/// assert_eq!(classify(17), Some(SizeClass::Bytes32));
/// assert_eq!(classify(2048), Some(SizeClass::Bytes2048));
/// assert_eq!(classify(2049), None);
/// ```
pub fn classify(size: usize) -> Option<SizeClass> {
    Some(match size {
        0..=16 => SizeClass::Bytes16,
        17..=32 => SizeClass::Bytes32,
        33..=64 => SizeClass::Bytes64,
        65..=128 => SizeClass::Bytes128,
        129..=256 => SizeClass::Bytes256,
        257..=512 => SizeClass::Bytes512,
        513..=1024 => SizeClass::Bytes1024,
        1025..=2048 => SizeClass::Bytes2048,
        _ => return None,
    })
}
