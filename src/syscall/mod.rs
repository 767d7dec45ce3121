//! System Call Interface
//!
//! The gate between user processes and the IPC core.
//!
//! # Security Model
//! - Whitelist approach: only explicitly implemented syscalls are allowed
//! - All parameters are validated before use
//! - Invalid inputs return errors, never panic
//!
//! # Current Syscalls
//! - 0: debug_write(buf, len) - append to the kernel debug sink
//! - 8: ipc_send(endpoint, buf, len, timeout) - enqueue a message
//! - 9: ipc_recv(endpoint, buf, capacity, timeout, sender_out) - dequeue a message
//! - 10: time_now() - current tick count
//! - 11: ipc_create_port() - create an endpoint owned by the caller
//! - 12: svc_lookup(name, len) - resolve a service name
//! - 13: svc_register(name, len, endpoint) - bind a service name

mod error;
mod handler;
pub mod validate;

pub use error::SyscallError;
pub use handler::{dispatch, numbers, SyscallRequest, SENDER_BYTES, SYSCALL_ARGS};
pub use validate::{UserBuffer, UserBufferMut};
