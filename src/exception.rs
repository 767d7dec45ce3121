//! ARM64 Exception Handling
//!
//! The vector table lives in boot.S; it saves an [`ExceptionContext`] on
//! the stack and calls one of the handlers below with a pointer to it.
//!
//! # Exception Levels
//! - EL0: User programs
//! - EL1: Kernel (where we run)
//!
//! SVC is accepted from both levels: the built-in programs run at EL1 and
//! still enter the kernel through `svc #0`, so they exercise the same
//! register convention a user program would.

use core::arch::asm;

use log::{error, warn};
use rugo::syscall::SyscallRequest;

use crate::{current_pid, kernel, kprintln};

/// Exception context saved on the stack. Layout is fixed by SAVE_CONTEXT.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExceptionContext {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

/// Exception class extracted from ESR_EL1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionClass {
    Unknown = 0x00,
    SvcAarch64 = 0x15,
    InstructionAbortLowerEl = 0x20,
    InstructionAbortSameEl = 0x21,
    DataAbortLowerEl = 0x24,
    DataAbortSameEl = 0x25,
    Other = 0xFF,
}

impl From<u64> for ExceptionClass {
    fn from(esr: u64) -> Self {
        let ec = ((esr >> 26) & 0x3F) as u8;
        match ec {
            0x00 => ExceptionClass::Unknown,
            0x15 => ExceptionClass::SvcAarch64,
            0x20 => ExceptionClass::InstructionAbortLowerEl,
            0x21 => ExceptionClass::InstructionAbortSameEl,
            0x24 => ExceptionClass::DataAbortLowerEl,
            0x25 => ExceptionClass::DataAbortSameEl,
            _ => ExceptionClass::Other,
        }
    }
}

/// Install the vector table (VBAR_EL1).
pub fn init() {
    extern "C" {
        static __exception_vectors: u8;
    }

    // SAFETY: __exception_vectors is defined in boot.S with 2KB alignment
    // and writing VBAR_EL1 is valid at EL1.
    unsafe {
        let vector_addr = core::ptr::addr_of!(__exception_vectors) as u64;
        asm!(
            "msr vbar_el1, {v}",
            "isb",
            v = in(reg) vector_addr,
            options(nostack, preserves_flags)
        );
    }

    kprintln!("[BOOT] Exception vectors installed");
}

/// x8 = selector, x0-x5 = arguments, result back in x0.
fn service_syscall(ctx: &mut ExceptionContext) {
    let Some(kernel) = kernel() else {
        error!("[SYSCALL] trap before the kernel was built");
        ctx.gpr[0] = rugo::SyscallError::Enosys.code() as u64;
        return;
    };

    let mut args = [0u64; rugo::syscall::SYSCALL_ARGS];
    args.copy_from_slice(&ctx.gpr[..rugo::syscall::SYSCALL_ARGS]);
    let req = SyscallRequest::new(ctx.gpr[8] as usize, args);

    ctx.gpr[0] = kernel.dispatch(current_pid(), &req) as u64;
}

/// Synchronous exception from EL0.
#[no_mangle]
pub extern "C" fn handle_sync_exception_lower_el(ctx: &mut ExceptionContext) {
    let ec = ExceptionClass::from(ctx.esr);

    match ec {
        ExceptionClass::SvcAarch64 => service_syscall(ctx),
        ExceptionClass::DataAbortLowerEl | ExceptionClass::InstructionAbortLowerEl => {
            let pid = current_pid();
            warn!(
                "[EXCEPTION] pid {} abort at 0x{:016x} (ESR 0x{:016x})",
                pid, ctx.far, ctx.esr
            );
            if let Some(kernel) = kernel() {
                if let Err(e) = kernel.exit(pid) {
                    error!("[EXCEPTION] exit {} failed: {}", pid, e);
                }
            }
            halt();
        }
        _ => {
            kprintln!("[EXCEPTION] Unhandled exception from user mode");
            kprintln!("[EXCEPTION] EC: {:?}, ESR: 0x{:016x}", ec, ctx.esr);
            halt();
        }
    }
}

/// Synchronous exception from EL1.
#[no_mangle]
pub extern "C" fn handle_sync_exception_same_el(ctx: &mut ExceptionContext) {
    let ec = ExceptionClass::from(ctx.esr);

    if ec == ExceptionClass::SvcAarch64 {
        service_syscall(ctx);
        return;
    }

    kprintln!("!!! KERNEL EXCEPTION !!!");
    kprintln!("Exception Class: {:?}", ec);
    kprintln!("ESR: 0x{:016x}", ctx.esr);
    kprintln!("ELR: 0x{:016x}", ctx.elr);
    kprintln!("FAR: 0x{:016x}", ctx.far);

    halt();
}

/// IRQ, FIQ and SError, from any level. Nothing enables them yet.
#[no_mangle]
pub extern "C" fn handle_unexpected(ctx: &ExceptionContext) {
    kprintln!("[EXCEPTION] Unexpected exception");
    kprintln!("ESR: 0x{:016x}", ctx.esr);
    kprintln!("ELR: 0x{:016x}", ctx.elr);
    halt();
}

fn halt() -> ! {
    loop {
        // SAFETY: WFI is always safe
        unsafe {
            asm!("wfi", options(nostack, nomem));
        }
    }
}
