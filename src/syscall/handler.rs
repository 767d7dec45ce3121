//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - All syscall numbers are validated against the whitelist
//! - Unknown syscalls return ENOSYS without running any handler
//! - Parameters are validated before use
//! - User buffers are copied into kernel memory before they are acted on

use alloc::vec::Vec;

use log::{trace, warn};

use super::error::SyscallError;
use super::validate::{validate_user_read, validate_user_write};
use crate::debug::DebugSink;
use crate::ipc::EndpointId;
use crate::kernel::Kernel;
use crate::process::Pid;
use crate::time::{Clock, Timeout};

/// System call numbers
pub mod numbers {
    /// (buf, len) -> bytes written
    pub const SYS_DEBUG_WRITE: usize = 0;
    /// (endpoint, buf, len, timeout) -> 0
    pub const SYS_IPC_SEND: usize = 8;
    /// (endpoint, buf, capacity, timeout, sender_out) -> bytes received
    pub const SYS_IPC_RECV: usize = 9;
    /// () -> ticks
    pub const SYS_TIME_NOW: usize = 10;
    /// () -> endpoint
    pub const SYS_IPC_CREATE_PORT: usize = 11;
    /// (name, len) -> endpoint
    pub const SYS_SVC_LOOKUP: usize = 12;
    /// (name, len, endpoint) -> 0
    pub const SYS_SVC_REGISTER: usize = 13;

    /// Name of a supported syscall, None for anything else.
    pub const fn name(num: usize) -> Option<&'static str> {
        match num {
            SYS_DEBUG_WRITE => Some("debug_write"),
            SYS_IPC_SEND => Some("ipc_send"),
            SYS_IPC_RECV => Some("ipc_recv"),
            SYS_TIME_NOW => Some("time_now"),
            SYS_IPC_CREATE_PORT => Some("ipc_create_port"),
            SYS_SVC_LOOKUP => Some("svc_lookup"),
            SYS_SVC_REGISTER => Some("svc_register"),
            _ => None,
        }
    }
}

/// Number of argument words a syscall carries (x0-x5).
pub const SYSCALL_ARGS: usize = 6;

/// Size of the sender pid `ipc_recv` stores for the caller.
pub const SENDER_BYTES: usize = core::mem::size_of::<u32>();

/// One system call as captured at the trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRequest {
    selector: usize,
    args: [u64; SYSCALL_ARGS],
}

impl SyscallRequest {
    pub const fn new(selector: usize, args: [u64; SYSCALL_ARGS]) -> Self {
        Self { selector, args }
    }

    #[inline]
    pub const fn selector(&self) -> usize {
        self.selector
    }

    /// Argument word `i`; zero past the end.
    #[inline]
    pub const fn arg(&self, i: usize) -> u64 {
        if i < SYSCALL_ARGS {
            self.args[i]
        } else {
            0
        }
    }

}

/// Dispatch a system call
///
/// # Arguments
/// * `kernel` - Kernel instance owning all IPC state
/// * `caller` - Process that trapped
/// * `req` - Selector and argument words
///
/// # Returns
/// Result word: non-negative on success, a negative `SyscallError` code
/// otherwise.
///
/// # Security
/// - Unknown syscall numbers are rejected with ENOSYS
/// - Unknown callers are rejected with ESRCH
/// - Each handler validates its own arguments
pub fn dispatch<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    req: &SyscallRequest,
) -> i64 {
    let Some(name) = numbers::name(req.selector()) else {
        warn!("[SYSCALL] Unknown syscall: {}", req.selector());
        return SyscallError::Enosys.code();
    };

    if !kernel.processes().contains(caller) {
        warn!("[SYSCALL] {} from unknown pid {}", name, caller);
        return SyscallError::Esrch.code();
    }

    let result = match req.selector() {
        numbers::SYS_DEBUG_WRITE => sys_debug_write(kernel, caller, req.arg(0), req.arg(1)),
        numbers::SYS_IPC_SEND => sys_ipc_send(
            kernel,
            caller,
            req.arg(0), // endpoint
            req.arg(1), // buf
            req.arg(2), // len
            req.arg(3), // timeout
        ),
        numbers::SYS_IPC_RECV => sys_ipc_recv(
            kernel,
            caller,
            req.arg(0), // endpoint
            req.arg(1), // buf
            req.arg(2), // capacity
            req.arg(3), // timeout
            req.arg(4), // sender_out
        ),
        numbers::SYS_TIME_NOW => Ok(kernel.clock().now()),
        numbers::SYS_IPC_CREATE_PORT => kernel.create_port(caller).map(EndpointId::as_word),
        numbers::SYS_SVC_LOOKUP => sys_svc_lookup(kernel, caller, req.arg(0), req.arg(1)),
        numbers::SYS_SVC_REGISTER => {
            sys_svc_register(kernel, caller, req.arg(0), req.arg(1), req.arg(2))
        }
        _ => Err(SyscallError::Enosys),
    };

    match result {
        Ok(value) => trace!("[SYSCALL] pid {} {}() = {}", caller, name, value),
        Err(e) => trace!("[SYSCALL] pid {} {}() failed: {}", caller, name, e),
    }
    SyscallError::encode(result)
}

/// Convert an argument word to a length or address.
#[inline]
fn word_to_usize(word: u64) -> Result<usize, SyscallError> {
    usize::try_from(word).map_err(|_| SyscallError::Einval)
}

/// Copy a validated user buffer into kernel memory.
fn copy_from_user<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    buf: u64,
    len: usize,
) -> Result<Vec<u8>, SyscallError> {
    let buf = word_to_usize(buf)?;
    kernel
        .processes()
        .with_space(caller, |space| validate_user_read(space, buf, len).map(|b| b.to_vec()))
}

/// Debug write system call
///
/// Copies a user buffer into the debug sink.
///
/// # Returns
/// Number of bytes written on success, negative error code on failure
///
/// # Security
/// - Length is bounds-checked before the buffer is touched
/// - Buffer pointer is validated against the caller's address space
/// - The write is all-or-nothing
fn sys_debug_write<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    buf: u64,
    len: u64,
) -> Result<u64, SyscallError> {
    let len = word_to_usize(len)?;
    if len > kernel.config().debug_write_max {
        return Err(SyscallError::Einval);
    }

    let bytes = copy_from_user(kernel, caller, buf, len)?;
    let written = kernel.debug_write(&bytes)?;
    Ok(written as u64)
}

/// IPC send system call
///
/// Copies the message into kernel memory and enqueues it on `endpoint`.
fn sys_ipc_send<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    endpoint: u64,
    buf: u64,
    len: u64,
    timeout: u64,
) -> Result<u64, SyscallError> {
    let endpoint = EndpointId::from_word(endpoint).ok_or(SyscallError::Enoent)?;
    let len = word_to_usize(len)?;
    if len > kernel.config().max_message_size {
        return Err(SyscallError::Einval);
    }

    let payload = copy_from_user(kernel, caller, buf, len)?;
    kernel.send(caller, endpoint, payload, Timeout::from_arg(timeout))?;
    Ok(0)
}

/// IPC receive system call
///
/// Dequeues the oldest message on `endpoint` into the caller's buffer. When
/// `sender_out` is non-zero the sender's pid is stored there as a
/// little-endian `u32`.
///
/// # Security
/// - Both destinations are validated as writable before anything is dequeued
/// - No lock is held while user memory is written
fn sys_ipc_recv<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    endpoint: u64,
    buf: u64,
    capacity: u64,
    timeout: u64,
    sender_out: u64,
) -> Result<u64, SyscallError> {
    let endpoint = EndpointId::from_word(endpoint).ok_or(SyscallError::Enoent)?;
    let buf = word_to_usize(buf)?;
    let capacity = word_to_usize(capacity)?;
    let sender_out = word_to_usize(sender_out)?;

    let (mut out, mut sender) = kernel.processes().with_space(caller, |space| {
        let out = validate_user_write(space, buf, capacity)?;
        let sender = match sender_out {
            0 => None,
            ptr => Some(validate_user_write(space, ptr, SENDER_BYTES)?),
        };
        Ok((out, sender))
    })?;

    let msg = kernel.recv(caller, endpoint, capacity, Timeout::from_arg(timeout))?;
    let n = out.write_prefix(msg.payload())?;
    if let Some(sender) = sender.as_mut() {
        sender.write_prefix(&msg.sender().as_u32().to_le_bytes())?;
    }
    Ok(n as u64)
}

/// Service lookup system call
fn sys_svc_lookup<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    name: u64,
    len: u64,
) -> Result<u64, SyscallError> {
    let len = word_to_usize(len)?;
    if len == 0 || len > kernel.config().service_name_max {
        return Err(SyscallError::Einval);
    }

    let name = copy_from_user(kernel, caller, name, len)?;
    kernel.lookup(&name).map(EndpointId::as_word)
}

/// Service register system call
fn sys_svc_register<S: DebugSink, C: Clock>(
    kernel: &Kernel<S, C>,
    caller: Pid,
    name: u64,
    len: u64,
    endpoint: u64,
) -> Result<u64, SyscallError> {
    let len = word_to_usize(len)?;
    if len == 0 || len > kernel.config().service_name_max {
        return Err(SyscallError::Einval);
    }
    let endpoint = EndpointId::from_word(endpoint).ok_or(SyscallError::Enoent)?;

    let name = copy_from_user(kernel, caller, name, len)?;
    kernel.register(caller, &name, endpoint)?;
    Ok(0)
}
