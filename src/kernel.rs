//! Kernel state
//!
//! [`Kernel`] owns every piece of mutable IPC state: the debug sink, the
//! endpoint arena, the service registry and the process table. There are
//! no ambient globals; the boot code creates one instance and the trap
//! handler reaches it through a reference.
//!
//! The typed methods here are what the syscall handlers call once user
//! arguments have been validated and copied. In-kernel code may call them
//! directly.

use alloc::vec::Vec;

use log::{info, warn};

use crate::config::KernelConfig;
use crate::debug::{DebugChannel, DebugSink};
use crate::ipc::{EndpointId, EndpointTable, Message};
use crate::process::{Pid, ProcessTable};
use crate::registry::ServiceRegistry;
use crate::syscall::validate::AddressSpace;
use crate::syscall::{self, SyscallError, SyscallRequest};
use crate::time::{Clock, Deadline, Timeout};

/// The IPC kernel core.
pub struct Kernel<S: DebugSink, C: Clock> {
    config: KernelConfig,
    debug: DebugChannel<S>,
    endpoints: EndpointTable,
    registry: ServiceRegistry,
    processes: ProcessTable,
    clock: C,
}

impl<S: DebugSink, C: Clock> Kernel<S, C> {
    /// Create a kernel with empty tables.
    pub fn new(config: KernelConfig, sink: S, clock: C) -> Self {
        info!(
            "[KERNEL] {} endpoints x {} msgs x {} bytes, {} services",
            config.max_endpoints, config.queue_depth, config.max_message_size, config.max_services
        );
        Self {
            debug: DebugChannel::new(sink, config.debug_write_max),
            endpoints: EndpointTable::new(config.max_endpoints, config.queue_depth),
            registry: ServiceRegistry::new(config.max_services, config.service_name_max),
            processes: ProcessTable::new(),
            clock,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[inline]
    pub fn debug(&self) -> &DebugChannel<S> {
        &self.debug
    }

    #[inline]
    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    #[inline]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    #[inline]
    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Handle one trapped system call.
    pub fn dispatch(&self, caller: Pid, req: &SyscallRequest) -> i64 {
        syscall::dispatch(self, caller, req)
    }

    /// Register a process whose buffers may point into `space`.
    pub fn spawn(&self, name: &str, space: AddressSpace) -> Pid {
        self.processes.insert(name, space)
    }

    /// Tear down a process.
    ///
    /// Registry entries for its endpoints are removed first so a lookup
    /// can never hand out an endpoint that is about to disappear; then the
    /// endpoints are destroyed and their pending messages dropped.
    pub fn exit(&self, pid: Pid) -> Result<(), SyscallError> {
        let process = self.processes.remove(pid).ok_or(SyscallError::Esrch)?;

        let owned = self.endpoints.owned_by(pid);
        let unregistered = self.registry.purge(&owned);
        let dropped: usize = owned
            .iter()
            .filter_map(|&id| self.endpoints.destroy(id).ok())
            .sum();

        info!(
            "[PROC] pid {} ({}) exited: {} endpoints, {} services, {} messages dropped",
            pid,
            process.name(),
            owned.len(),
            unregistered,
            dropped
        );
        Ok(())
    }

    /// Append kernel-owned bytes to the debug sink.
    pub fn debug_write(&self, bytes: &[u8]) -> Result<usize, SyscallError> {
        self.debug.write(bytes)
    }

    /// Create an endpoint owned by `caller`, subject to the per-process quota.
    ///
    /// Runs with the process pinned, so an endpoint is never created for a
    /// pid that `exit` has already swept.
    pub fn create_port(&self, caller: Pid) -> Result<EndpointId, SyscallError> {
        self.processes
            .while_alive(caller, || {
                self.endpoints
                    .create(caller, self.config.endpoints_per_process)
            })
            .map_err(|e| {
                warn!("[IPC] create_port for pid {} failed: {}", caller, e);
                e
            })
    }

    /// Enqueue `payload` on `endpoint` as a message from `caller`.
    pub fn send(
        &self,
        caller: Pid,
        endpoint: EndpointId,
        payload: Vec<u8>,
        timeout: Timeout,
    ) -> Result<(), SyscallError> {
        if !self.processes.contains(caller) {
            return Err(SyscallError::Esrch);
        }
        if payload.len() > self.config.max_message_size {
            return Err(SyscallError::Einval);
        }
        let deadline = Deadline::after(&self.clock, timeout);
        self.endpoints
            .send(endpoint, Message::new(caller, payload), deadline, &self.clock)
    }

    /// Dequeue the oldest message on `endpoint` that fits `capacity`.
    pub fn recv(
        &self,
        caller: Pid,
        endpoint: EndpointId,
        capacity: usize,
        timeout: Timeout,
    ) -> Result<Message, SyscallError> {
        if !self.processes.contains(caller) {
            return Err(SyscallError::Esrch);
        }
        let deadline = Deadline::after(&self.clock, timeout);
        self.endpoints
            .recv(endpoint, caller, capacity, deadline, &self.clock)
    }

    /// Bind `name` to `endpoint`. Only the endpoint's owner may do this.
    pub fn register(
        &self,
        caller: Pid,
        name: &[u8],
        endpoint: EndpointId,
    ) -> Result<(), SyscallError> {
        self.processes.while_alive(caller, || {
            if self.endpoints.owner_of(endpoint)? != caller {
                warn!("[SVC] pid {} does not own {}", caller, endpoint);
                return Err(SyscallError::Eperm);
            }
            self.registry.register(name, endpoint, caller)
        })
    }

    /// Resolve `name` to a live endpoint.
    pub fn lookup(&self, name: &[u8]) -> Result<EndpointId, SyscallError> {
        let endpoint = self.registry.lookup(name)?;
        // An exit in progress may have destroyed the endpoint after the
        // registry answered.
        if !self.endpoints.contains(endpoint) {
            return Err(SyscallError::Enoent);
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::MemorySink;
    use crate::time::TickCounter;
    use std::sync::Arc;
    use std::thread;

    type TestKernel = Kernel<MemorySink, TickCounter>;

    fn kernel(config: KernelConfig) -> TestKernel {
        Kernel::new(config, MemorySink::new(1024), TickCounter::new())
    }

    #[test]
    fn test_exit_tears_down_endpoints_and_names() {
        let k = kernel(KernelConfig::DEFAULT);
        let server = k.spawn("pong", AddressSpace::empty());
        let client = k.spawn("ping", AddressSpace::empty());

        let ep = k.create_port(server).unwrap();
        k.register(server, b"pong", ep).unwrap();
        k.send(client, ep, b"PING".to_vec(), Timeout::Poll).unwrap();

        k.exit(server).unwrap();

        assert_eq!(k.lookup(b"pong"), Err(SyscallError::Enoent));
        assert_eq!(
            k.send(client, ep, b"PING".to_vec(), Timeout::Poll),
            Err(SyscallError::Enoent)
        );
        assert!(k.endpoints().is_empty());
        assert!(k.registry().is_empty());
        assert_eq!(k.exit(server), Err(SyscallError::Esrch));
    }

    #[test]
    fn test_lookup_never_returns_stale_id_after_slot_reuse() {
        let k = kernel(KernelConfig::DEFAULT.with_max_endpoints(1));
        let a = k.spawn("a", AddressSpace::empty());
        let ep = k.create_port(a).unwrap();
        k.register(a, b"svc", ep).unwrap();
        k.exit(a).unwrap();

        let b = k.spawn("b", AddressSpace::empty());
        let fresh = k.create_port(b).unwrap();
        assert_ne!(fresh, ep);
        assert_eq!(k.lookup(b"svc"), Err(SyscallError::Enoent));
    }

    #[test]
    fn test_exited_process_cannot_create_or_use_ports() {
        let k = kernel(KernelConfig::DEFAULT.with_max_endpoints(1));
        let a = k.spawn("a", AddressSpace::empty());
        let ep = k.create_port(a).unwrap();
        k.exit(a).unwrap();

        assert_eq!(k.create_port(a), Err(SyscallError::Esrch));
        assert_eq!(k.register(a, b"svc", ep), Err(SyscallError::Esrch));
        assert_eq!(
            k.send(a, ep, b"x".to_vec(), Timeout::Poll),
            Err(SyscallError::Esrch)
        );
        assert_eq!(k.recv(a, ep, 8, Timeout::Poll).err(), Some(SyscallError::Esrch));
        assert!(k.endpoints().is_empty());

        // The only slot is still free for a live process
        let b = k.spawn("b", AddressSpace::empty());
        assert!(k.create_port(b).is_ok());
    }

    #[test]
    fn test_exit_racing_create_port_leaves_nothing_behind() {
        let k = Arc::new(kernel(KernelConfig::DEFAULT));
        for _ in 0..200 {
            let pid = k.spawn("racer", AddressSpace::empty());
            let creator = {
                let k = Arc::clone(&k);
                thread::spawn(move || loop {
                    match k.create_port(pid) {
                        Err(SyscallError::Esrch) => break,
                        _ => thread::yield_now(),
                    }
                })
            };
            thread::yield_now();
            k.exit(pid).unwrap();
            creator.join().unwrap();

            assert!(k.endpoints().owned_by(pid).is_empty());
            assert!(k.endpoints().is_empty());
        }
    }

    #[test]
    fn test_register_requires_ownership() {
        let k = kernel(KernelConfig::DEFAULT);
        let owner = k.spawn("owner", AddressSpace::empty());
        let thief = k.spawn("thief", AddressSpace::empty());
        let ep = k.create_port(owner).unwrap();
        assert_eq!(k.register(thief, b"svc", ep), Err(SyscallError::Eperm));
        assert_eq!(k.lookup(b"svc"), Err(SyscallError::Enoent));
    }

    #[test]
    fn test_registry_full() {
        let k = kernel(KernelConfig::DEFAULT.with_max_services(4));
        let pid = k.spawn("svc", AddressSpace::empty());
        let ep = k.create_port(pid).unwrap();
        for name in [b"s0", b"s1", b"s2", b"s3"] {
            k.register(pid, name, ep).unwrap();
        }
        assert_eq!(k.register(pid, b"s4", ep), Err(SyscallError::Enospc));
    }

    #[test]
    fn test_endpoint_quota_exact() {
        let k = kernel(KernelConfig::DEFAULT.with_endpoints_per_process(3));
        let pid = k.spawn("q", AddressSpace::empty());
        for _ in 0..3 {
            k.create_port(pid).unwrap();
        }
        assert_eq!(k.create_port(pid), Err(SyscallError::Enospc));
    }

    #[test]
    fn test_send_to_full_queue_preserves_original() {
        let k = kernel(KernelConfig::DEFAULT.with_queue_depth(1));
        let pid = k.spawn("p", AddressSpace::empty());
        let ep = k.create_port(pid).unwrap();
        k.send(pid, ep, b"first".to_vec(), Timeout::Poll).unwrap();
        assert_eq!(
            k.send(pid, ep, b"second".to_vec(), Timeout::Poll),
            Err(SyscallError::Eagain)
        );
        let m = k.recv(pid, ep, 64, Timeout::Poll).unwrap();
        assert_eq!(m.payload(), b"first");
    }

    #[test]
    fn test_blocked_receiver_wakes_on_send() {
        let k = Arc::new(kernel(KernelConfig::DEFAULT));
        let server = k.spawn("server", AddressSpace::empty());
        let client = k.spawn("client", AddressSpace::empty());
        let ep = k.create_port(server).unwrap();

        let receiver = {
            let k = Arc::clone(&k);
            thread::spawn(move || k.recv(server, ep, 64, Timeout::Ticks(u64::MAX)))
        };
        k.send(client, ep, b"wake".to_vec(), Timeout::Poll).unwrap();

        let m = receiver.join().unwrap().unwrap();
        assert_eq!(m.payload(), b"wake");
        assert_eq!(m.sender(), client);
    }
}
