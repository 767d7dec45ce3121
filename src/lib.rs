//! Rugo - syscall gate and IPC core for a small ARM64 kernel
//!
//! This crate holds everything that sits behind the syscall boundary and
//! does not touch hardware, so it builds for the bare-metal image and for
//! the host test harness alike.
//!
//! # Components
//! - Syscall dispatch gate with validated user buffers
//! - Debug channel into a kernel-owned sink
//! - IPC endpoints with bounded FIFO queues
//! - Service registry for name-to-endpoint lookup
//! - Kernel bridge handshake
//!
//! # Security Features
//! - User buffers are validated against the caller's address space
//! - User bytes are copied into kernel memory before use
//! - Message payloads are zeroized when dropped

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod bridge;
pub mod config;
pub mod debug;
pub mod ipc;
pub mod kernel;
pub mod process;
pub mod registry;
pub mod security;
pub mod syscall;
pub mod time;
pub mod user;

pub use config::KernelConfig;
pub use kernel::Kernel;
pub use process::Pid;
pub use syscall::{SyscallError, SyscallRequest};
