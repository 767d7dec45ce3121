//! Kernel tick clock
//!
//! The IPC layer only needs a monotonically increasing counter to measure
//! timeouts against, plus a hook to call while it waits.

use core::sync::atomic::{AtomicU64, Ordering};

/// Source of kernel time.
pub trait Clock: Send + Sync {
    /// Current tick count. Must never go backwards.
    fn now(&self) -> u64;

    /// Called between retries of a timed IPC operation.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// Tick counter advanced by the timer interrupt.
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicU64,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Advance by one tick; returns the new count.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Advance by `n` ticks.
    #[inline]
    pub fn advance(&self, n: u64) {
        self.ticks.fetch_add(n, Ordering::Relaxed);
    }
}

impl Clock for TickCounter {
    #[inline]
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn relax(&self) {
        (**self).relax()
    }
}

/// How long a send or receive may wait, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately if the operation cannot complete.
    Poll,
    /// Retry for up to this many ticks.
    Ticks(u64),
}

impl Timeout {
    /// Decode the syscall argument word; zero means poll.
    pub const fn from_arg(ticks: u64) -> Self {
        if ticks == 0 {
            Self::Poll
        } else {
            Self::Ticks(ticks)
        }
    }
}

/// Absolute point in time after which a wait gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<u64>,
}

impl Deadline {
    /// Deadline `timeout` ticks after `clock.now()`; `None` for a poll.
    pub fn after<C: Clock + ?Sized>(clock: &C, timeout: Timeout) -> Self {
        let at = match timeout {
            Timeout::Poll => None,
            Timeout::Ticks(n) => Some(clock.now().saturating_add(n)),
        };
        Self { at }
    }

    /// True when the caller asked not to wait at all.
    #[inline]
    pub fn is_poll(&self) -> bool {
        self.at.is_none()
    }

    /// True once the deadline has passed (always true for a poll).
    pub fn expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        match self.at {
            None => true,
            Some(at) => clock.now() >= at,
        }
    }
}
