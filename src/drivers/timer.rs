//! ARM generic timer as the IPC clock
//!
//! Timeouts are measured against the physical counter, scaled to
//! millisecond ticks. No interrupt is needed since waiters poll.

use core::arch::asm;

use rugo::time::Clock;

/// Ticks per second handed to the IPC layer.
const TICK_HZ: u64 = 1000;

/// Reads CNTPCT_EL0.
pub struct GenericTimer;

impl GenericTimer {
    fn frequency() -> u64 {
        let frq: u64;
        // SAFETY: CNTFRQ_EL0 is readable at EL1 and has no side effects.
        unsafe {
            asm!("mrs {f}, cntfrq_el0", f = out(reg) frq, options(nomem, nostack));
        }
        frq
    }

    fn counter() -> u64 {
        let cnt: u64;
        // SAFETY: CNTPCT_EL0 is readable at EL1 and has no side effects.
        unsafe {
            asm!("isb", "mrs {c}, cntpct_el0", c = out(reg) cnt, options(nostack));
        }
        cnt
    }
}

impl Clock for GenericTimer {
    fn now(&self) -> u64 {
        let per_tick = Self::frequency() / TICK_HZ;
        if per_tick == 0 {
            return 0;
        }
        Self::counter() / per_tick
    }

    fn relax(&self) {
        // SAFETY: YIELD is a hint.
        unsafe {
            asm!("yield", options(nomem, nostack, preserves_flags));
        }
    }
}
