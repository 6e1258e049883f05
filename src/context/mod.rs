//! Device contexts.
//!
//! A device context owns the configuration for one logical unit of work on a
//! device and provides the memory primitives the tensor runtime needs:
//!
//! - aligned allocation, returned as a raw pointer paired with its
//!   [`Deallocator`], or as an owning [`AlignedBuffer`]
//! - typed copies between buffers
//!
//! Every address handed out by a context is a multiple of [`ALIGNMENT`].
//!
//! # Example
//!
//! ```ignore
//! use tensorkv::context::{CpuContext, DeviceContext, DeviceOption};
//!
//! let ctx = CpuContext::new(DeviceOption::cpu())?;
//!
//! let src: Vec<f32> = (0..10).map(|i| i as f32).collect();
//! let mut dst = vec![0.0f32; 10];
//! ctx.copy_items(10, &src, &mut dst)?;
//! assert_eq!(src, dst);
//! ```

mod buffer;
mod cpu;

use std::fmt;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

pub use buffer::{ALIGNMENT, AlignedBuffer, Deallocator};
pub use cpu::CpuContext;

/// Kind of device a context targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceType {
    /// Host memory.
    #[default]
    Cpu,
    /// A CUDA device. Configurations may name it, but no context in this crate
    /// drives one.
    Cuda,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Cuda => write!(f, "CUDA"),
        }
    }
}

/// Configuration for a device context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceOption {
    /// Device the context runs on.
    pub device_type: DeviceType,
    /// Index of the device when several of the same type are present.
    pub device_id: u32,
    /// Seed for the context's random generator. `None` seeds from OS entropy.
    pub random_seed: Option<u64>,
    /// Name of the node this option was written for, if any.
    pub node_name: Option<String>,
}

impl DeviceOption {
    /// Option targeting the host CPU.
    pub fn cpu() -> Self {
        Self::default()
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// Errors reported by device contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The system allocator could not satisfy the request.
    AllocationFailed { size: usize, align: usize },
    /// The requested size cannot be described by a memory layout.
    InvalidLayout { size: usize },
    /// A copy asked for more elements than a buffer holds.
    OutOfBounds { requested: usize, available: usize },
    /// The option targets a different device than the context.
    DeviceMismatch {
        expected: DeviceType,
        actual: DeviceType,
    },
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::AllocationFailed { size, align } => {
                write!(f, "failed to allocate {size} bytes aligned to {align}")
            }
            ContextError::InvalidLayout { size } => {
                write!(f, "invalid allocation size: {size} bytes")
            }
            ContextError::OutOfBounds {
                requested,
                available,
            } => {
                write!(
                    f,
                    "copy of {requested} elements exceeds buffer of {available} elements"
                )
            }
            ContextError::DeviceMismatch { expected, actual } => {
                write!(f, "expected a {expected} device option, got {actual}")
            }
        }
    }
}

impl std::error::Error for ContextError {}

/// Memory primitives for one device.
pub trait DeviceContext {
    /// The device this context drives.
    fn device_type(&self) -> DeviceType;

    /// Allocates `nbytes` bytes aligned to [`ALIGNMENT`].
    ///
    /// The caller owns the returned memory and must release it by passing the
    /// same pointer to the returned [`Deallocator`].
    fn allocate(&self, nbytes: usize) -> Result<(NonNull<u8>, Deallocator), ContextError>;

    /// Copies `nbytes` bytes from `src` to `dst`.
    fn copy_bytes(&self, nbytes: usize, src: &[u8], dst: &mut [u8]) -> Result<(), ContextError>;

    /// Copies `n` elements from `src` to `dst`.
    fn copy_items<T: Copy>(&self, n: usize, src: &[T], dst: &mut [T]) -> Result<(), ContextError>;

    /// Blocks until work queued on the device has completed.
    ///
    /// Host contexts execute synchronously, so the default does nothing.
    fn finish_device_computation(&self) {}
}
