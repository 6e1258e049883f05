use std::ptr::{self, NonNull};

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::buffer::{AlignedBuffer, Deallocator, allocate_aligned};
use super::{ContextError, DeviceContext, DeviceOption, DeviceType};
use crate::config::Flags;

/// Device context for host memory.
///
/// A `CpuContext` is created for one unit of work and carries the
/// [`DeviceOption`] it was built from together with a random generator seeded
/// from that option. It holds no other state, so independent contexts can be
/// used from different threads freely.
#[derive(Debug)]
pub struct CpuContext {
    option: DeviceOption,
    zero_fill: bool,
    rng: StdRng,
}

impl CpuContext {
    /// Creates a context for `option` with default [`Flags`].
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::DeviceMismatch`] if `option` targets another device.
    pub fn new(option: DeviceOption) -> Result<Self, ContextError> {
        Self::with_flags(option, &Flags::default())
    }

    /// Creates a context for `option`, taking the allocator settings from `flags`.
    pub fn with_flags(option: DeviceOption, flags: &Flags) -> Result<Self, ContextError> {
        if option.device_type != DeviceType::Cpu {
            return Err(ContextError::DeviceMismatch {
                expected: DeviceType::Cpu,
                actual: option.device_type,
            });
        }

        let rng = match option.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            option,
            zero_fill: flags.cpu_allocator_zero_fill,
            rng,
        })
    }

    /// The option this context was created from.
    pub fn option(&self) -> &DeviceOption {
        &self.option
    }

    /// Random generator owned by this context.
    pub fn rand_generator(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Allocates an owned, zero-initialised buffer of `nbytes` bytes.
    ///
    /// Allocator failure is fatal and reported through
    /// [`std::alloc::handle_alloc_error`].
    pub fn new_buffer(&self, nbytes: usize) -> AlignedBuffer {
        AlignedBuffer::new(nbytes)
    }

    /// Copies `n` elements between raw allocations without any checks.
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads and `dst` valid for writes of `n`
    /// elements, both properly aligned and non-null, and the two ranges must
    /// not overlap.
    pub unsafe fn copy_items_unchecked<T: Copy>(&self, n: usize, src: *const T, dst: *mut T) {
        // SAFETY: upheld by the caller
        unsafe { ptr::copy_nonoverlapping(src, dst, n) }
    }
}

fn check_len(requested: usize, available: usize) -> Result<(), ContextError> {
    if requested > available {
        return Err(ContextError::OutOfBounds {
            requested,
            available,
        });
    }
    Ok(())
}

impl DeviceContext for CpuContext {
    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn allocate(&self, nbytes: usize) -> Result<(NonNull<u8>, Deallocator), ContextError> {
        allocate_aligned(nbytes, self.zero_fill)
    }

    fn copy_bytes(&self, nbytes: usize, src: &[u8], dst: &mut [u8]) -> Result<(), ContextError> {
        self.copy_items(nbytes, src, dst)
    }

    fn copy_items<T: Copy>(&self, n: usize, src: &[T], dst: &mut [T]) -> Result<(), ContextError> {
        check_len(n, src.len())?;
        check_len(n, dst.len())?;
        dst[..n].copy_from_slice(&src[..n]);
        Ok(())
    }
}
