//! Zeroization of kernel copies of user data
//!
//! Message payloads sit in kernel memory between send and receive. Once a
//! message is delivered or its endpoint is torn down, those bytes are
//! overwritten so a later allocation can never observe another process'
//! traffic.
//!
//! Volatile writes followed by a compiler fence keep the zeroing from
//! being optimized away.

use alloc::vec::Vec;
use core::ops::Deref;
use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

/// Types whose contents can be securely cleared.
pub trait Zeroize {
    /// Overwrite this value with zeros.
    fn zeroize(&mut self);
}

impl Zeroize for [u8] {
    fn zeroize(&mut self) {
        // SAFETY: We have a valid mutable reference to the slice
        unsafe {
            volatile_set_memory(self.as_mut_ptr(), 0, self.len());
        }
        compiler_fence(Ordering::SeqCst);
    }
}

/// Clears the initialized bytes, then empties the vector.
///
/// Spare capacity was never written with payload data, so it is left alone.
impl Zeroize for Vec<u8> {
    fn zeroize(&mut self) {
        self.as_mut_slice().zeroize();
        self.clear();
    }
}

/// Owned value that is zeroized when dropped.
///
/// Read access goes through `Deref`; there is no way to move the value
/// out without it being cleared first.
#[derive(Debug)]
pub struct Zeroizing<T: Zeroize> {
    inner: T,
}

impl<T: Zeroize> Zeroizing<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }
}

impl<T: Zeroize> Deref for Zeroizing<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Zeroize> Drop for Zeroizing<T> {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Volatile memset that cannot be optimized away.
///
/// # Safety
/// - `dst` must be valid for writes of `count` bytes
#[inline]
unsafe fn volatile_set_memory(dst: *mut u8, val: u8, count: usize) {
    for i in 0..count {
        // SAFETY: Caller guarantees dst is valid for count bytes
        unsafe {
            ptr::write_volatile(dst.add(i), val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroize_slice() {
        let mut data = [0x42u8; 16];
        data.as_mut_slice().zeroize();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zeroize_vec_clears() {
        let mut data = alloc::vec![0x42u8; 8];
        data.zeroize();
        assert!(data.is_empty());
    }

    #[test]
    fn test_zeroizing_derefs() {
        let wrapped = Zeroizing::new(alloc::vec![1u8, 2, 3]);
        assert_eq!(wrapped.as_slice(), &[1, 2, 3]);
        assert_eq!(wrapped.len(), 3);
    }
}
