//! Kernel bridge handshake
//!
//! Early boot hands execution to a second runtime component through a
//! plain C-ABI call. That component answers with a fixed sentinel so the
//! caller can tell the hand-off actually ran before it continues booting.

use core::fmt;

use log::{error, info};

/// Value the bridge entry point returns on every call.
pub const HANDSHAKE_SENTINEL: i64 = 42;

/// Signature of a bridge entry point.
pub type BridgeEntry = extern "C" fn() -> i64;

/// Handshake failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// The entry point ran but returned something other than the sentinel.
    BadSentinel(i64),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSentinel(got) => write!(
                f,
                "bridge returned {} instead of {}",
                got, HANDSHAKE_SENTINEL
            ),
        }
    }
}

/// Kernel-side bridge entry point.
#[no_mangle]
pub extern "C" fn rugo_bridge_entry() -> i64 {
    HANDSHAKE_SENTINEL
}

/// Call `entry` and check that it answered with the sentinel.
pub fn handshake(entry: BridgeEntry) -> Result<(), BridgeError> {
    let got = entry();
    if got == HANDSHAKE_SENTINEL {
        info!("[BRIDGE] handshake ok");
        Ok(())
    } else {
        error!("[BRIDGE] handshake failed: got {}", got);
        Err(BridgeError::BadSentinel(got))
    }
}
