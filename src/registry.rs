//! Service Registry
//!
//! Fixed-size directory mapping service names to endpoint ids, used for
//! late-bound discovery: a server registers a name for one of its
//! endpoints and clients look the name up before sending.
//!
//! # Rules
//! - Names are byte strings compared exactly (no wildcards, no versions)
//! - Registering an existing name overwrites it, but only for its owner
//! - Entries disappear when their endpoint is destroyed

use alloc::vec::Vec;

use log::{debug, info};
use spin::Mutex;

use crate::ipc::EndpointId;
use crate::process::Pid;
use crate::syscall::SyscallError;

#[derive(Debug)]
struct ServiceEntry {
    name: Vec<u8>,
    endpoint: EndpointId,
    owner: Pid,
}

/// Name-to-endpoint directory.
#[derive(Debug)]
pub struct ServiceRegistry {
    entries: Mutex<Vec<ServiceEntry>>,
    capacity: usize,
    name_max: usize,
}

impl ServiceRegistry {
    pub fn new(capacity: usize, name_max: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            name_max,
        }
    }

    fn check_name(&self, name: &[u8]) -> Result<(), SyscallError> {
        if name.is_empty() || name.len() > self.name_max {
            return Err(SyscallError::Einval);
        }
        Ok(())
    }

    /// Bind `name` to `endpoint` on behalf of `owner`.
    ///
    /// The caller is responsible for checking that `owner` owns `endpoint`.
    ///
    /// # Errors
    /// - `Einval` for an empty or over-long name
    /// - `Eperm` if the name is held by a different owner
    /// - `Enospc` if the name is new and the table is full
    pub fn register(
        &self,
        name: &[u8],
        endpoint: EndpointId,
        owner: Pid,
    ) -> Result<(), SyscallError> {
        self.check_name(name)?;
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.iter_mut().find(|e| e.name == name) {
            if entry.owner != owner {
                debug!(
                    "[SVC] pid {} may not take over a name held by pid {}",
                    owner, entry.owner
                );
                return Err(SyscallError::Eperm);
            }
            entry.endpoint = endpoint;
            info!("[SVC] re-registered ({} bytes) -> {}", name.len(), endpoint);
            return Ok(());
        }

        if entries.len() >= self.capacity {
            return Err(SyscallError::Enospc);
        }

        entries.push(ServiceEntry {
            name: name.to_vec(),
            endpoint,
            owner,
        });
        info!("[SVC] registered ({} bytes) -> {}", name.len(), endpoint);
        Ok(())
    }

    /// Resolve a name to its endpoint.
    ///
    /// # Errors
    /// - `Einval` for an empty or over-long name
    /// - `Enoent` if the name is not registered
    pub fn lookup(&self, name: &[u8]) -> Result<EndpointId, SyscallError> {
        self.check_name(name)?;
        self.entries
            .lock()
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.endpoint)
            .ok_or(SyscallError::Enoent)
    }

    /// Drop every entry that points at one of `endpoints`.
    ///
    /// Returns the number of entries removed.
    pub fn purge(&self, endpoints: &[EndpointId]) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !endpoints.contains(&e.endpoint));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Pid = Pid::new(1);
    const OTHER: Pid = Pid::new(2);

    fn ep(n: u32) -> EndpointId {
        EndpointId::from_word(n as u64).unwrap()
    }

    #[test]
    fn test_lookup_unregistered() {
        let reg = ServiceRegistry::new(4, 32);
        assert_eq!(reg.lookup(b"pong"), Err(SyscallError::Enoent));
    }

    #[test]
    fn test_register_and_exact_lookup() {
        let reg = ServiceRegistry::new(4, 32);
        reg.register(b"pong", ep(1), OWNER).unwrap();
        assert_eq!(reg.lookup(b"pong"), Ok(ep(1)));
        assert_eq!(reg.lookup(b"pon"), Err(SyscallError::Enoent));
        assert_eq!(reg.lookup(b"pong2"), Err(SyscallError::Enoent));
        assert_eq!(reg.lookup(b"PONG"), Err(SyscallError::Enoent));
    }

    #[test]
    fn test_overwrite_by_owner() {
        let reg = ServiceRegistry::new(4, 32);
        reg.register(b"fs", ep(1), OWNER).unwrap();
        reg.register(b"fs", ep(2), OWNER).unwrap();
        assert_eq!(reg.lookup(b"fs"), Ok(ep(2)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_overwrite_by_other_owner_denied() {
        let reg = ServiceRegistry::new(4, 32);
        reg.register(b"fs", ep(1), OWNER).unwrap();
        assert_eq!(reg.register(b"fs", ep(2), OTHER), Err(SyscallError::Eperm));
        assert_eq!(reg.lookup(b"fs"), Ok(ep(1)));
    }

    #[test]
    fn test_full_rejects_new_name_but_allows_overwrite() {
        let reg = ServiceRegistry::new(2, 32);
        reg.register(b"a", ep(1), OWNER).unwrap();
        reg.register(b"b", ep(2), OWNER).unwrap();
        assert_eq!(reg.register(b"c", ep(3), OWNER), Err(SyscallError::Enospc));
        assert!(reg.register(b"a", ep(3), OWNER).is_ok());
    }

    #[test]
    fn test_name_bounds() {
        let reg = ServiceRegistry::new(2, 4);
        assert_eq!(reg.register(b"", ep(1), OWNER), Err(SyscallError::Einval));
        assert_eq!(reg.register(b"toolong", ep(1), OWNER), Err(SyscallError::Einval));
        assert_eq!(reg.lookup(b""), Err(SyscallError::Einval));
        assert!(reg.register(b"four", ep(1), OWNER).is_ok());
    }

    #[test]
    fn test_purge() {
        let reg = ServiceRegistry::new(4, 32);
        reg.register(b"a", ep(1), OWNER).unwrap();
        reg.register(b"b", ep(2), OWNER).unwrap();
        reg.register(b"c", ep(1), OWNER).unwrap();
        assert_eq!(reg.purge(&[ep(1)]), 2);
        assert_eq!(reg.lookup(b"a"), Err(SyscallError::Enoent));
        assert_eq!(reg.lookup(b"b"), Ok(ep(2)));
    }
}
