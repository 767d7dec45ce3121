//! Board drivers
//!
//! All drivers follow these principles:
//! - Minimal unsafe code, well-documented
//! - No panics on invalid input

pub mod timer;
pub mod uart;
