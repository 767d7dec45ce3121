//! Inter-Process Communication
//!
//! Bounded, copy-in/copy-out message passing through kernel-owned
//! endpoints.
//!
//! # Guarantees
//! - Messages from one sender to one endpoint arrive in send order
//! - A send either enqueues the whole message or nothing
//! - A receive never returns a zero-length success for an empty queue
//! - Sends and receives fail fast unless the caller passes a timeout

mod endpoint;
mod table;

pub use endpoint::{Endpoint, EndpointId, Message};
pub use table::EndpointTable;
