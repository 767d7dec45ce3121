//! Memory management
//!
//! Only the kernel heap for now; the image runs identity-mapped with the
//! MMU off.

mod allocator;

pub use allocator::{heap_size, heap_used, init_heap};
