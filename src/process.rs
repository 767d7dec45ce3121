//! Process table
//!
//! Scheduling and address-space construction live outside this crate; a
//! process here is only what the syscall layer needs: an identity and the
//! user memory its buffers may point into.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use spin::Mutex;

use crate::syscall::validate::AddressSpace;
use crate::syscall::SyscallError;

/// Process identifier. Never reused within one kernel instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process as seen by the syscall layer.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    name: String,
    space: AddressSpace,
}

impl Process {
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }
}

/// All live processes, keyed by pid.
#[derive(Debug)]
pub struct ProcessTable {
    procs: Mutex<BTreeMap<Pid, Process>>,
    next_pid: AtomicU32,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            procs: Mutex::new(BTreeMap::new()),
            // Pid 0 is left unused so a zeroed word never names a process
            next_pid: AtomicU32::new(1),
        }
    }

    /// Add a process and return its pid.
    pub fn insert(&self, name: &str, space: AddressSpace) -> Pid {
        let pid = Pid(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let regions = space.regions().len();
        let process = Process {
            pid,
            name: String::from(name),
            space,
        };
        self.procs.lock().insert(pid, process);
        debug!("[PROC] pid {} ({}) created, {} regions", pid, name, regions);
        pid
    }

    /// Remove a process from the table.
    pub fn remove(&self, pid: Pid) -> Option<Process> {
        self.procs.lock().remove(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.procs.lock().contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.procs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.lock().is_empty()
    }

    /// Run `f` against the address space of `pid`.
    ///
    /// Fails with `Esrch` if the process does not exist.
    pub fn with_space<R>(
        &self,
        pid: Pid,
        f: impl FnOnce(&AddressSpace) -> Result<R, SyscallError>,
    ) -> Result<R, SyscallError> {
        let procs = self.procs.lock();
        let process = procs.get(&pid).ok_or(SyscallError::Esrch)?;
        f(&process.space)
    }

    /// Run `f` while `pid` is guaranteed to stay in the table.
    ///
    /// The table lock is held for the duration of `f`, so a concurrent
    /// [`remove`](Self::remove) either happens before (and `f` never runs)
    /// or after `f` has finished. `f` must not block.
    pub fn while_alive<R>(
        &self,
        pid: Pid,
        f: impl FnOnce() -> Result<R, SyscallError>,
    ) -> Result<R, SyscallError> {
        let procs = self.procs.lock();
        if !procs.contains_key(&pid) {
            return Err(SyscallError::Esrch);
        }
        let result = f();
        drop(procs);
        result
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pids_are_unique_and_nonzero() {
        let table = ProcessTable::new();
        let a = table.insert("a", AddressSpace::empty());
        let b = table.insert("b", AddressSpace::empty());
        assert_ne!(a, b);
        assert_ne!(a.as_u32(), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove() {
        let table = ProcessTable::new();
        let pid = table.insert("init", AddressSpace::empty());
        assert!(table.contains(pid));
        let process = table.remove(pid).unwrap();
        assert_eq!(process.name(), "init");
        assert!(!table.contains(pid));
        assert!(table.remove(pid).is_none());
    }

    #[test]
    fn test_with_space_unknown_pid() {
        let table = ProcessTable::new();
        let res = table.with_space(Pid::new(99), |_| Ok(()));
        assert_eq!(res, Err(SyscallError::Esrch));
    }

    #[test]
    fn test_while_alive() {
        let table = ProcessTable::new();
        let pid = table.insert("p", AddressSpace::empty());
        assert_eq!(table.while_alive(pid, || Ok(7)), Ok(7));

        table.remove(pid);
        let mut ran = false;
        let res = table.while_alive(pid, || {
            ran = true;
            Ok(())
        });
        assert_eq!(res, Err(SyscallError::Esrch));
        assert!(!ran);
    }
}
