//! IPC endpoints
//!
//! An endpoint is a bounded FIFO of messages owned by one process. Any
//! process may send to it; only the owner may receive from it.
//!
//! ```text
//!  sender A ─┐                       ┌──────────────────────────┐
//!  sender B ─┼── try_push ──────────►│ m0 │ m1 │ m2 │ .. │ depth │──► pop_fitting ──► owner
//!  sender C ─┘                       └──────────────────────────┘
//! ```

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use crate::process::Pid;
use crate::security::Zeroizing;
use crate::syscall::SyscallError;

/// Endpoint identifier as seen by user space.
///
/// The low 16 bits hold the arena slot plus one, the high 16 bits the
/// slot's generation. Zero is never a valid id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EndpointId(u32);

impl EndpointId {
    const INDEX_MASK: u32 = 0xFFFF;
    const GENERATION_SHIFT: u32 = 16;

    /// Largest number of slots an id can address.
    pub const MAX_SLOTS: usize = Self::INDEX_MASK as usize;

    pub(crate) const fn from_parts(index: usize, generation: u16) -> Self {
        Self(((generation as u32) << Self::GENERATION_SHIFT) | (index as u32 + 1))
    }

    /// Reinterpret a syscall argument word as an id.
    ///
    /// Returns None for zero and for words wider than 32 bits.
    pub const fn from_word(word: u64) -> Option<Self> {
        if word == 0 || word > u32::MAX as u64 {
            None
        } else {
            Some(Self(word as u32))
        }
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_word(self) -> u64 {
        self.0 as u64
    }

    pub(crate) const fn index(self) -> Option<usize> {
        match self.0 & Self::INDEX_MASK {
            0 => None,
            slot => Some(slot as usize - 1),
        }
    }

    pub(crate) const fn generation(self) -> u16 {
        (self.0 >> Self::GENERATION_SHIFT) as u16
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep#{}", self.0)
    }
}

/// A queued message. The payload is zeroized when the message is dropped.
#[derive(Debug)]
pub struct Message {
    sender: Pid,
    payload: Zeroizing<Vec<u8>>,
}

impl Message {
    pub fn new(sender: Pid, payload: Vec<u8>) -> Self {
        Self {
            sender,
            payload: Zeroizing::new(payload),
        }
    }

    #[inline]
    pub fn sender(&self) -> Pid {
        self.sender
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Endpoint state, guarded by its own lock in the arena.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    owner: Pid,
    queue: VecDeque<Message>,
    depth: usize,
    closed: bool,
}

impl Endpoint {
    pub(crate) fn new(id: EndpointId, owner: Pid, depth: usize) -> Self {
        Self {
            id,
            owner,
            queue: VecDeque::with_capacity(depth),
            depth,
            closed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }

    /// Number of pending messages.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.depth
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Enqueue a message at the tail.
    ///
    /// On failure the message is handed back untouched so the caller can
    /// retry without copying the user buffer again.
    pub fn try_push(&mut self, msg: Message) -> Result<(), (SyscallError, Message)> {
        if self.closed {
            return Err((SyscallError::Enoent, msg));
        }
        if self.is_full() {
            return Err((SyscallError::Eagain, msg));
        }
        self.queue.push_back(msg);
        Ok(())
    }

    /// Dequeue the oldest message if it fits in `capacity` bytes.
    ///
    /// # Errors
    /// - `Enoent` if the endpoint has been closed
    /// - `Enomsg` if nothing is pending
    /// - `Emsgsize` if the oldest message is longer than `capacity`; it
    ///   stays at the head of the queue
    pub fn pop_fitting(&mut self, capacity: usize) -> Result<Message, SyscallError> {
        if self.closed {
            return Err(SyscallError::Enoent);
        }
        let head = self.queue.front().ok_or(SyscallError::Enomsg)?;
        if head.len() > capacity {
            return Err(SyscallError::Emsgsize);
        }
        self.queue.pop_front().ok_or(SyscallError::Enomsg)
    }

    /// Close the endpoint and drop every pending message.
    ///
    /// Returns the number of messages discarded.
    pub(crate) fn close(&mut self) -> usize {
        self.closed = true;
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
