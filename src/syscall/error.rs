//! System Call Error Codes
//!
//! Every failure crossing the syscall boundary is one of these values.
//! The numbering follows the Linux errno table so user code can use
//! familiar names, and each variant is negative so that any non-negative
//! result word means success.

use core::fmt;

/// System call error codes
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Caller does not own the object
    Eperm = -1,
    /// No such endpoint or service
    Enoent = -2,
    /// Calling process is unknown
    Esrch = -3,
    /// Queue is full, the send would block
    Eagain = -11,
    /// Bad address (invalid pointer)
    Efault = -14,
    /// Invalid argument
    Einval = -22,
    /// A fixed-size kernel resource is exhausted
    Enospc = -28,
    /// Invalid system call number
    Enosys = -38,
    /// No message pending on the endpoint
    Enomsg = -42,
    /// Receive buffer is smaller than the pending message
    Emsgsize = -90,
    /// Timeout elapsed before the operation could complete
    Etimedout = -110,
}

impl SyscallError {
    /// The raw result word for this error.
    #[inline]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Map a raw result word back to an error.
    ///
    /// Returns None for success values and for codes this kernel never
    /// produces.
    pub const fn from_code(code: i64) -> Option<Self> {
        let err = match code {
            -1 => Self::Eperm,
            -2 => Self::Enoent,
            -3 => Self::Esrch,
            -11 => Self::Eagain,
            -14 => Self::Efault,
            -22 => Self::Einval,
            -28 => Self::Enospc,
            -38 => Self::Enosys,
            -42 => Self::Enomsg,
            -90 => Self::Emsgsize,
            -110 => Self::Etimedout,
            _ => return None,
        };
        Some(err)
    }

    /// Decode a result word into a `Result`.
    ///
    /// Unknown negative codes are reported as `Enosys`.
    pub const fn decode(word: i64) -> Result<u64, Self> {
        if word >= 0 {
            return Ok(word as u64);
        }
        match Self::from_code(word) {
            Some(err) => Err(err),
            None => Err(Self::Enosys),
        }
    }

    /// Encode a handler result into the word returned to user space.
    pub fn encode(result: Result<u64, Self>) -> i64 {
        match result {
            // Values that do not fit the positive half are clamped; none of
            // the handlers produce them.
            Ok(value) => i64::try_from(value).unwrap_or(i64::MAX),
            Err(err) => err.code(),
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Eperm => "operation not permitted",
            Self::Enoent => "no such endpoint or service",
            Self::Esrch => "no such process",
            Self::Eagain => "queue full",
            Self::Efault => "bad address",
            Self::Einval => "invalid argument",
            Self::Enospc => "resource exhausted",
            Self::Enosys => "unsupported syscall",
            Self::Enomsg => "no message pending",
            Self::Emsgsize => "buffer too small",
            Self::Etimedout => "timed out",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative() {
        for err in [
            SyscallError::Eperm,
            SyscallError::Enoent,
            SyscallError::Esrch,
            SyscallError::Eagain,
            SyscallError::Efault,
            SyscallError::Einval,
            SyscallError::Enospc,
            SyscallError::Enosys,
            SyscallError::Enomsg,
            SyscallError::Emsgsize,
            SyscallError::Etimedout,
        ] {
            assert!(err.code() < 0);
            assert_eq!(SyscallError::from_code(err.code()), Some(err));
        }
    }

    #[test]
    fn test_decode() {
        assert_eq!(SyscallError::decode(0), Ok(0));
        assert_eq!(SyscallError::decode(17), Ok(17));
        assert_eq!(SyscallError::decode(-42), Err(SyscallError::Enomsg));
        assert_eq!(SyscallError::decode(-9999), Err(SyscallError::Enosys));
    }

    #[test]
    fn test_encode() {
        assert_eq!(SyscallError::encode(Ok(5)), 5);
        assert_eq!(SyscallError::encode(Err(SyscallError::Efault)), -14);
    }
}
