//! Rugo - bare-metal image for the QEMU `virt` machine
//!
//! Boots on a single core at EL1, checks the kernel bridge, builds the IPC
//! kernel and runs the built-in programs through `svc #0`.
//!
//! # Architecture
//! - Target: AArch64 (ARM64)
//! - Hypervisor: QEMU virt machine
//! - Boot: Direct kernel boot (no bootloader), MMU off

#![no_std]
#![no_main]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

mod drivers;
mod exception;
mod logger;
mod mm;

use core::arch::global_asm;
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU32, Ordering};

use log::{error, info, LevelFilter};
use spin::Once;

use rugo::bridge::{self, rugo_bridge_entry};
use rugo::syscall::validate::{AddressSpace, RegionFlags, UserRegion};
use rugo::user::{self, Svc};
use rugo::{Kernel, KernelConfig, Pid};

use drivers::timer::GenericTimer;
use drivers::uart::{UartSink, UART};

global_asm!(include_str!("boot.S"));

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// QEMU virt RAM window the built-in programs may pass buffers from.
const RAM_BASE: usize = 0x4000_0000;
const RAM_SIZE: usize = 128 * 1024 * 1024;

type BoardKernel = Kernel<UartSink, GenericTimer>;

static KERNEL: Once<BoardKernel> = Once::new();

/// Pid the next trap is charged to. Zero until a program runs.
static CURRENT: AtomicU32 = AtomicU32::new(0);

pub(crate) fn kernel() -> Option<&'static BoardKernel> {
    KERNEL.get()
}

pub(crate) fn current_pid() -> Pid {
    Pid::new(CURRENT.load(Ordering::Acquire))
}

/// Kernel entry point called from boot.S
///
/// Stack and BSS are already set up.
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    // SAFETY: QEMU virt always maps the PL011 at UART_BASE
    unsafe {
        UART.lock().init();
    }

    kprintln!();
    kprintln!("Rugo v{} - ARM64 IPC kernel", VERSION);
    kprintln!("============================");
    kprintln!();

    if logger::init(LevelFilter::Info).is_err() {
        kprintln!("[BOOT] logger already installed");
    }

    mm::init_heap();
    info!("[BOOT] Heap initialized ({} KiB)", mm::heap_size() / 1024);

    exception::init();

    if let Err(e) = bridge::handshake(rugo_bridge_entry) {
        error!("[BOOT] {}", e);
        halt();
    }

    let kernel = KERNEL.call_once(|| Kernel::new(KernelConfig::DEFAULT, UartSink, GenericTimer));

    let Some(ram) = UserRegion::new(RAM_BASE, RAM_SIZE, RegionFlags::READ_WRITE) else {
        error!("[BOOT] bad RAM window");
        halt();
    };
    info!(
        "[BOOT] user window 0x{:x}..0x{:x} {:?}",
        ram.start(),
        ram.end(),
        ram.flags()
    );

    run(kernel, "init", AddressSpace::with_region(ram), user::run_hello);
    run(kernel, "echo", AddressSpace::with_region(ram), user::run_echo);

    info!("[BOOT] heap in use: {} bytes", mm::heap_used());
    kprintln!("[BOOT] Kernel initialization complete");
    halt();
}

/// Spawn a process, run `program` as it and tear it down again.
fn run(
    kernel: &BoardKernel,
    name: &str,
    space: AddressSpace,
    program: fn(&Svc) -> Result<(), rugo::SyscallError>,
) {
    let pid = kernel.spawn(name, space);
    CURRENT.store(pid.as_u32(), Ordering::Release);

    match program(&Svc) {
        Ok(()) => info!("[PROC] {} finished", name),
        Err(e) => error!("[PROC] {} failed: {}", name, e),
    }

    CURRENT.store(0, Ordering::Release);
    if let Err(e) = kernel.exit(pid) {
        error!("[PROC] exit {} failed: {}", pid, e);
    }
}

fn halt() -> ! {
    loop {
        // SAFETY: WFI is always safe to execute
        unsafe {
            core::arch::asm!("wfi");
        }
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kprintln!();
    kprintln!("!!! KERNEL PANIC !!!");
    kprintln!();

    if let Some(location) = info.location() {
        kprintln!(
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }

    kprintln!("Message: {}", info.message());

    kprintln!();
    kprintln!("System halted.");

    halt();
}
