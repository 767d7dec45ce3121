//! System Call Input Validation
//!
//! Every buffer reference that crosses the syscall boundary is checked
//! against the calling process' address space before the kernel touches it.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - Prevent common vulnerabilities:
//!   - Buffer overflows (bounds checking)
//!   - TOCTOU races (handlers copy to kernel memory)
//!   - Null pointer dereference (explicit checks)

use alloc::vec::Vec;

use bitflags::bitflags;

use super::error::SyscallError;

bitflags! {
    /// Access a user region grants to the kernel on the process' behalf.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionFlags: u8 {
        /// The kernel may read from the region.
        const READ = 1 << 0;
        /// The kernel may write into the region.
        const WRITE = 1 << 1;
        /// Read and write.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A contiguous range of user memory, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRegion {
    start: usize,
    end: usize,
    flags: RegionFlags,
}

impl UserRegion {
    /// Create a region from a start address and a length.
    ///
    /// Returns None if the region is empty, starts at null, or wraps.
    pub fn new(start: usize, len: usize, flags: RegionFlags) -> Option<Self> {
        if start == 0 || len == 0 {
            return None;
        }
        let end = start.checked_add(len)?;
        Some(Self { start, end, flags })
    }

    /// Region covering a slice the caller owns.
    pub fn from_slice(bytes: &[u8], flags: RegionFlags) -> Option<Self> {
        Self::new(bytes.as_ptr() as usize, bytes.len(), flags)
    }

    #[inline]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub const fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// Check that `[ptr, end)` lies inside this region with `required` access.
    #[inline]
    fn covers(&self, ptr: usize, end: usize, required: RegionFlags) -> bool {
        ptr >= self.start && end <= self.end && self.flags.contains(required)
    }
}

/// The user memory a process may hand to the kernel.
///
/// Regions are not merged, so a buffer must fit inside a single region.
#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    regions: Vec<UserRegion>,
}

impl AddressSpace {
    /// An address space with no user memory; every non-empty buffer faults.
    pub const fn empty() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Address space with a single region.
    pub fn with_region(region: UserRegion) -> Self {
        let mut space = Self::empty();
        space.add_region(region);
        space
    }

    /// Add a region.
    pub fn add_region(&mut self, region: UserRegion) {
        self.regions.push(region);
    }

    /// Regions in insertion order.
    pub fn regions(&self) -> &[UserRegion] {
        &self.regions
    }

    fn check(&self, ptr: usize, len: usize, required: RegionFlags) -> Result<(), SyscallError> {
        // Check null pointer
        if ptr == 0 {
            return Err(SyscallError::Efault);
        }

        // Check for overflow
        let end = ptr.checked_add(len).ok_or(SyscallError::Efault)?;

        if self.regions.iter().any(|r| r.covers(ptr, end, required)) {
            Ok(())
        } else {
            Err(SyscallError::Efault)
        }
    }
}

/// A validated user-space buffer
///
/// This type guarantees that:
/// - The buffer is within one readable user region
/// - The length doesn't overflow
///
/// # Safety
/// This struct is only constructed after validation passes.
#[derive(Debug)]
pub struct UserBuffer {
    ptr: *const u8,
    len: usize,
}

impl UserBuffer {
    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer as a byte slice
    ///
    /// The contents may change underneath the kernel, so handlers copy them
    /// out with [`UserBuffer::to_vec`] before acting on them.
    pub fn as_bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY:
        // - Pointer is validated to be inside a readable user region
        // - Length is validated to not overflow
        // - The region is mapped for as long as the process exists
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Copy the buffer into kernel memory.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Validate a user-space read buffer
///
/// # Arguments
/// * `space` - Address space of the calling process
/// * `ptr` - User-space buffer address
/// * `len` - Buffer length in bytes
///
/// # Security Checks
/// 1. Pointer is not null
/// 2. Pointer + length doesn't overflow
/// 3. The whole range lies inside one region readable by the kernel
pub fn validate_user_read(
    space: &AddressSpace,
    ptr: usize,
    len: usize,
) -> Result<UserBuffer, SyscallError> {
    // Zero-length reads are valid
    if len == 0 {
        return Ok(UserBuffer {
            ptr: ptr as *const u8,
            len: 0,
        });
    }

    space.check(ptr, len, RegionFlags::READ)?;

    Ok(UserBuffer {
        ptr: ptr as *const u8,
        len,
    })
}

/// Validate a user-space write buffer
///
/// Same as read validation, but the region must be writable.
pub fn validate_user_write(
    space: &AddressSpace,
    ptr: usize,
    len: usize,
) -> Result<UserBufferMut, SyscallError> {
    if len == 0 {
        return Ok(UserBufferMut {
            ptr: ptr as *mut u8,
            len: 0,
        });
    }

    space.check(ptr, len, RegionFlags::WRITE)?;

    Ok(UserBufferMut {
        ptr: ptr as *mut u8,
        len,
    })
}

/// A validated mutable user-space buffer
#[derive(Debug)]
pub struct UserBufferMut {
    ptr: *mut u8,
    len: usize,
}

impl UserBufferMut {
    /// Capacity in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer as a mutable byte slice
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: Same as UserBuffer::as_bytes, and the region is writable
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Copy `src` to the start of the buffer.
    ///
    /// Fails with `Emsgsize` if `src` does not fit.
    pub fn write_prefix(&mut self, src: &[u8]) -> Result<usize, SyscallError> {
        if src.len() > self.len {
            return Err(SyscallError::Emsgsize);
        }
        self.as_bytes_mut()[..src.len()].copy_from_slice(src);
        Ok(src.len())
    }
}
