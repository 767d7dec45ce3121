//! Kernel Heap Allocator
//!
//! Uses `linked_list_allocator` for heap management. Endpoint queues,
//! message payloads and the registry all live here.

use core::ptr::addr_of_mut;

use linked_list_allocator::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// 256 KiB covers the default table sizes several times over.
const HEAP_SIZE: usize = 256 * 1024;

static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Initialize the kernel heap
///
/// Must run exactly once, before the first allocation.
pub fn init_heap() {
    // SAFETY: HEAP_MEMORY is only ever touched here, and kernel_main calls
    // this once before anything allocates.
    unsafe {
        let heap_start = addr_of_mut!(HEAP_MEMORY) as *mut u8;
        ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
    }
}

/// Get the size of the kernel heap
pub fn heap_size() -> usize {
    HEAP_SIZE
}

/// Bytes currently handed out.
pub fn heap_used() -> usize {
    ALLOCATOR.lock().used()
}
