//! Security Primitives Module
//!
//! - Zeroization of kernel-held copies of user data
//!
//! # Security Properties
//! - Message payloads are always zeroed when no longer needed
//! - Memory is cleared using volatile writes to prevent optimization

pub mod zeroize;

pub use zeroize::{Zeroize, Zeroizing};
