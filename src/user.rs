//! User-side syscall library
//!
//! Typed wrappers over the raw selector/argument/result-word convention,
//! plus the small built-in programs the kernel image runs at boot.
//!
//! The trap mechanism is abstracted behind [`Trap`] so the same program
//! can run through a real `svc` on the board or be looped straight into a
//! [`Kernel`] in tests.

use crate::debug::DebugSink;
use crate::ipc::EndpointId;
use crate::kernel::Kernel;
use crate::process::Pid;
use crate::syscall::numbers::*;
use crate::syscall::{SyscallError, SyscallRequest, SENDER_BYTES, SYSCALL_ARGS};
use crate::time::Clock;

/// Banner the init program writes through the debug channel.
pub const HELLO: &[u8] = b"USER: hello ok\n";

/// Name the echo program registers its endpoint under.
pub const ECHO_SERVICE: &[u8] = b"echo";

/// A way of entering the kernel.
pub trait Trap {
    /// Issue syscall `selector` and return the raw result word.
    fn syscall(&self, selector: usize, args: [u64; SYSCALL_ARGS]) -> i64;
}

/// Trap that calls straight into a kernel instance as `pid`.
pub struct KernelTrap<'k, S: DebugSink, C: Clock> {
    kernel: &'k Kernel<S, C>,
    pid: Pid,
}

impl<'k, S: DebugSink, C: Clock> KernelTrap<'k, S, C> {
    pub fn new(kernel: &'k Kernel<S, C>, pid: Pid) -> Self {
        Self { kernel, pid }
    }
}

impl<S: DebugSink, C: Clock> Trap for KernelTrap<'_, S, C> {
    fn syscall(&self, selector: usize, args: [u64; SYSCALL_ARGS]) -> i64 {
        self.kernel
            .dispatch(self.pid, &SyscallRequest::new(selector, args))
    }
}

/// AArch64 `svc #0`: selector in x8, arguments in x0-x5, result in x0.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub struct Svc;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl Trap for Svc {
    fn syscall(&self, selector: usize, args: [u64; SYSCALL_ARGS]) -> i64 {
        let mut x0 = args[0];
        // SAFETY: The exception vector saves and restores every register
        // except x0, which carries the result. The kernel may read or write
        // the buffers named in the arguments, so memory is not marked
        // untouched.
        unsafe {
            core::arch::asm!(
                "svc #0",
                inout("x0") x0,
                in("x1") args[1],
                in("x2") args[2],
                in("x3") args[3],
                in("x4") args[4],
                in("x5") args[5],
                in("x8") selector,
                options(nostack),
            );
        }
        x0 as i64
    }
}

#[inline]
fn ptr_word(bytes: &[u8]) -> u64 {
    bytes.as_ptr() as usize as u64
}

fn decode_endpoint(word: u64) -> Result<EndpointId, SyscallError> {
    EndpointId::from_word(word).ok_or(SyscallError::Enoent)
}

/// Write `bytes` to the kernel debug sink.
pub fn debug_write<T: Trap + ?Sized>(trap: &T, bytes: &[u8]) -> Result<usize, SyscallError> {
    let word = trap.syscall(
        SYS_DEBUG_WRITE,
        [ptr_word(bytes), bytes.len() as u64, 0, 0, 0, 0],
    );
    SyscallError::decode(word).map(|n| n as usize)
}

/// Send `msg` to `endpoint`, waiting up to `timeout` ticks (0 = fail fast).
pub fn ipc_send<T: Trap + ?Sized>(
    trap: &T,
    endpoint: EndpointId,
    msg: &[u8],
    timeout: u64,
) -> Result<(), SyscallError> {
    let word = trap.syscall(
        SYS_IPC_SEND,
        [endpoint.as_word(), ptr_word(msg), msg.len() as u64, timeout, 0, 0],
    );
    SyscallError::decode(word).map(|_| ())
}

/// Receive the oldest message on `endpoint` into `out`.
///
/// Returns the message length and the pid that sent it.
pub fn ipc_recv<T: Trap + ?Sized>(
    trap: &T,
    endpoint: EndpointId,
    out: &mut [u8],
    timeout: u64,
) -> Result<(usize, Pid), SyscallError> {
    let mut sender = [0u8; SENDER_BYTES];
    let word = trap.syscall(
        SYS_IPC_RECV,
        [
            endpoint.as_word(),
            out.as_mut_ptr() as usize as u64,
            out.len() as u64,
            timeout,
            sender.as_mut_ptr() as usize as u64,
            0,
        ],
    );
    let n = SyscallError::decode(word)?;
    Ok((n as usize, Pid::new(u32::from_le_bytes(sender))))
}

/// Create an endpoint owned by the calling process.
pub fn ipc_create_port<T: Trap + ?Sized>(trap: &T) -> Result<EndpointId, SyscallError> {
    let word = trap.syscall(SYS_IPC_CREATE_PORT, [0; SYSCALL_ARGS]);
    SyscallError::decode(word).and_then(decode_endpoint)
}

/// Resolve a service name.
pub fn svc_lookup<T: Trap + ?Sized>(trap: &T, name: &[u8]) -> Result<EndpointId, SyscallError> {
    let word = trap.syscall(
        SYS_SVC_LOOKUP,
        [ptr_word(name), name.len() as u64, 0, 0, 0, 0],
    );
    SyscallError::decode(word).and_then(decode_endpoint)
}

/// Bind `name` to an endpoint the caller owns.
pub fn svc_register<T: Trap + ?Sized>(
    trap: &T,
    name: &[u8],
    endpoint: EndpointId,
) -> Result<(), SyscallError> {
    let word = trap.syscall(
        SYS_SVC_REGISTER,
        [ptr_word(name), name.len() as u64, endpoint.as_word(), 0, 0, 0],
    );
    SyscallError::decode(word).map(|_| ())
}

/// Current kernel tick count.
pub fn time_now<T: Trap + ?Sized>(trap: &T) -> Result<u64, SyscallError> {
    SyscallError::decode(trap.syscall(SYS_TIME_NOW, [0; SYSCALL_ARGS]))
}

/// Init program: print the banner.
pub fn run_hello<T: Trap + ?Sized>(trap: &T) -> Result<(), SyscallError> {
    debug_write(trap, HELLO).map(|_| ())
}

/// Echo program: register a service, find it again and bounce a message
/// through it.
pub fn run_echo<T: Trap + ?Sized>(trap: &T) -> Result<(), SyscallError> {
    let mine = ipc_create_port(trap)?;
    svc_register(trap, ECHO_SERVICE, mine)?;

    let target = svc_lookup(trap, ECHO_SERVICE)?;
    ipc_send(trap, target, b"PING", 0)?;

    let mut reply = [0u8; 16];
    let (n, _) = ipc_recv(trap, mine, &mut reply, 0)?;
    if &reply[..n] != b"PING" {
        return Err(SyscallError::Einval);
    }

    debug_write(trap, b"IPC: echo ok\n").map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::MemorySink;
    use crate::syscall::validate::{AddressSpace, RegionFlags, UserRegion};
    use crate::time::TickCounter;
    use crate::KernelConfig;
    use core::sync::atomic::{AtomicBool, Ordering};

    /// Host programs use stack and static buffers, so the test process may
    /// point anywhere.
    fn anywhere() -> AddressSpace {
        AddressSpace::with_region(
            UserRegion::new(1, usize::MAX - 1, RegionFlags::READ_WRITE).unwrap(),
        )
    }

    fn kernel() -> Kernel<MemorySink, TickCounter> {
        Kernel::new(KernelConfig::DEFAULT, MemorySink::new(1024), TickCounter::new())
    }

    #[test]
    fn test_hello_writes_banner() {
        let k = kernel();
        let pid = k.spawn("init", anywhere());
        run_hello(&KernelTrap::new(&k, pid)).unwrap();
        k.debug().with_sink(|s| assert_eq!(s.contents(), HELLO));
    }

    #[test]
    fn test_echo_roundtrip() {
        let k = kernel();
        let pid = k.spawn("echo", anywhere());
        run_echo(&KernelTrap::new(&k, pid)).unwrap();
        k.debug().with_sink(|s| assert_eq!(s.contents(), b"IPC: echo ok\n"));
    }

    #[test]
    fn test_ping_pong_between_processes() {
        let k = kernel();
        let pong_pid = k.spawn("pong", anywhere());
        let ping_pid = k.spawn("ping", anywhere());
        let pong = KernelTrap::new(&k, pong_pid);
        let ping = KernelTrap::new(&k, ping_pid);

        let pong_ep = ipc_create_port(&pong).unwrap();
        svc_register(&pong, b"pong", pong_ep).unwrap();
        let ping_ep = ipc_create_port(&ping).unwrap();
        svc_register(&ping, b"ping", ping_ep).unwrap();

        let target = svc_lookup(&ping, b"pong").unwrap();
        assert_eq!(target, pong_ep);
        ipc_send(&ping, target, b"PING", 0).unwrap();

        let mut buf = [0u8; 128];
        let (n, from) = ipc_recv(&pong, pong_ep, &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"PING");
        assert_eq!(from, ping_pid);

        let reply_to = svc_lookup(&pong, b"ping").unwrap();
        ipc_send(&pong, reply_to, b"PONG", 0).unwrap();

        let (n, from) = ipc_recv(&ping, ping_ep, &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"PONG");
        assert_eq!(from, pong_pid);

        // Only the owner may drain an endpoint
        assert_eq!(ipc_recv(&ping, pong_ep, &mut buf, 0), Err(SyscallError::Eperm));
    }

    #[test]
    fn test_fifo_through_syscalls() {
        let k = kernel();
        let t = KernelTrap::new(&k, k.spawn("p", anywhere()));
        let ep = ipc_create_port(&t).unwrap();
        for m in [b"a".as_slice(), b"bb", b"ccc", b"dddd"] {
            ipc_send(&t, ep, m, 0).unwrap();
        }
        assert_eq!(ipc_send(&t, ep, b"e", 0), Err(SyscallError::Eagain));

        let mut buf = [0u8; 8];
        for expected in [b"a".as_slice(), b"bb", b"ccc", b"dddd"] {
            let (n, _) = ipc_recv(&t, ep, &mut buf, 0).unwrap();
            assert_eq!(&buf[..n], expected);
        }
        assert_eq!(ipc_recv(&t, ep, &mut buf, 0), Err(SyscallError::Enomsg));
    }

    #[test]
    fn test_recv_too_small_then_retry() {
        let k = kernel();
        let t = KernelTrap::new(&k, k.spawn("p", anywhere()));
        let ep = ipc_create_port(&t).unwrap();
        ipc_send(&t, ep, b"0123456789", 0).unwrap();

        let mut small = [0u8; 4];
        assert_eq!(ipc_recv(&t, ep, &mut small, 0), Err(SyscallError::Emsgsize));
        let mut big = [0u8; 16];
        assert_eq!(ipc_recv(&t, ep, &mut big, 0).map(|(n, _)| n), Ok(10));
    }

    #[test]
    fn test_recv_timeout_through_syscall() {
        let k = kernel();
        let t = KernelTrap::new(&k, k.spawn("p", anywhere()));
        let ep = ipc_create_port(&t).unwrap();
        let mut buf = [0u8; 8];

        // Nothing else advances the tick counter here.
        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    k.clock().tick();
                    std::thread::yield_now();
                }
            });
            let got = ipc_recv(&t, ep, &mut buf, 5);
            done.store(true, Ordering::Release);
            assert_eq!(got, Err(SyscallError::Etimedout));
        });
        assert!(time_now(&t).unwrap() >= 5);
    }
}
