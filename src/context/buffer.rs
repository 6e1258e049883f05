use std::alloc::{self, Layout};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use super::ContextError;

/// Alignment, in bytes, of every allocation made by a device context.
///
/// 32 bytes covers AVX/AVX2 aligned loads used by the numeric kernels.
pub const ALIGNMENT: usize = 32;

/// The freeing half of an allocation.
///
/// A `Deallocator` remembers the layout its allocation was made with. It is
/// consumed when invoked, so one allocation is released at most once.
#[must_use = "dropping a Deallocator without calling it leaks the allocation"]
pub struct Deallocator {
    layout: Layout,
}

impl Deallocator {
    /// Layout the paired allocation was made with.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Releases the paired allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must be the pointer returned together with this deallocator, and
    /// no references into the allocation may outlive this call.
    pub unsafe fn deallocate(self, ptr: NonNull<u8>) {
        // SAFETY: the caller guarantees ptr came from the allocation made with self.layout
        unsafe { alloc::dealloc(ptr.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for Deallocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deallocator")
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

/// Layout for an `nbytes` request. Zero-byte requests reserve one byte so the
/// pointer is real and aligned.
fn layout_for(nbytes: usize) -> Result<Layout, ContextError> {
    Layout::from_size_align(nbytes.max(1), ALIGNMENT)
        .map_err(|_| ContextError::InvalidLayout { size: nbytes })
}

/// Allocates `nbytes` bytes aligned to [`ALIGNMENT`].
pub(crate) fn allocate_aligned(
    nbytes: usize,
    zero_fill: bool,
) -> Result<(NonNull<u8>, Deallocator), ContextError> {
    let layout = layout_for(nbytes)?;

    // SAFETY: layout has a non-zero size
    let ptr = unsafe {
        if zero_fill {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };

    let ptr = NonNull::new(ptr).ok_or(ContextError::AllocationFailed {
        size: nbytes,
        align: ALIGNMENT,
    })?;

    Ok((ptr, Deallocator { layout }))
}

/// An owned, zero-initialised allocation aligned to [`ALIGNMENT`].
///
/// The memory is released when the buffer is dropped. Use
/// [`AlignedBuffer::into_raw_parts`] to take over that responsibility.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// SAFETY: AlignedBuffer owns its memory exclusively
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates a zeroed buffer of `len` bytes.
    pub fn try_new(len: usize) -> Result<Self, ContextError> {
        let (ptr, deallocator) = allocate_aligned(len, true)?;
        Ok(Self {
            ptr,
            len,
            layout: deallocator.layout,
        })
    }

    /// Allocates a zeroed buffer of `len` bytes, aborting through
    /// [`std::alloc::handle_alloc_error`] when the allocator refuses.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the largest layout the platform can describe.
    pub fn new(len: usize) -> Self {
        let layout = match layout_for(len) {
            Ok(layout) => layout,
            Err(e) => panic!("{e}"),
        };
        match Self::try_new(len) {
            Ok(buffer) => buffer,
            Err(_) => alloc::handle_alloc_error(layout),
        }
    }

    /// Length of the buffer in bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer holds no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the start of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable raw pointer to the start of the buffer.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns true if the start address is a multiple of `alignment`.
    #[inline]
    pub fn is_aligned_to(&self, alignment: usize) -> bool {
        (self.ptr.as_ptr() as usize) % alignment == 0
    }

    /// Gives up ownership, returning the pointer and the deallocator that frees it.
    pub fn into_raw_parts(self) -> (NonNull<u8>, Deallocator) {
        let this = ManuallyDrop::new(self);
        (
            this.ptr,
            Deallocator {
                layout: this.layout,
            },
        )
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with this layout and is owned by self
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialised bytes
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len initialised bytes and self is borrowed mutably
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("ptr", &self.ptr)
            .finish()
    }
}
