//! Endpoint arena
//!
//! Endpoints live in a fixed number of slots indexed by their id. The
//! arena itself sits behind a reader-writer lock that is only held long
//! enough to find a slot; each endpoint has its own mutex, so traffic on
//! one endpoint never serializes against another.

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, trace};
use spin::{Mutex, RwLock};

use super::endpoint::{Endpoint, EndpointId, Message};
use crate::process::Pid;
use crate::syscall::SyscallError;
use crate::time::{Clock, Deadline};

type SharedEndpoint = Arc<Mutex<Endpoint>>;

#[derive(Debug, Default)]
struct Slot {
    generation: u16,
    endpoint: Option<SharedEndpoint>,
}

/// Arena of endpoints.
#[derive(Debug)]
pub struct EndpointTable {
    slots: RwLock<Vec<Slot>>,
    depth: usize,
}

impl EndpointTable {
    /// Create an arena of `capacity` slots whose queues hold `depth` messages.
    ///
    /// Capacity is clamped to what an [`EndpointId`] can address.
    pub fn new(capacity: usize, depth: usize) -> Self {
        let capacity = capacity.min(EndpointId::MAX_SLOTS);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            slots: RwLock::new(slots),
            depth,
        }
    }

    /// Allocate an endpoint owned by `owner`.
    ///
    /// # Errors
    /// `Enospc` if every slot is taken or `owner` already owns `quota`
    /// endpoints.
    pub fn create(&self, owner: Pid, quota: usize) -> Result<EndpointId, SyscallError> {
        let mut slots = self.slots.write();

        let owned = slots
            .iter()
            .filter_map(|s| s.endpoint.as_ref())
            .filter(|ep| ep.lock().owner() == owner)
            .count();
        if owned >= quota {
            debug!("[IPC] pid {} hit endpoint quota ({})", owner, quota);
            return Err(SyscallError::Enospc);
        }

        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.endpoint.is_none())
            .ok_or(SyscallError::Enospc)?;

        let id = EndpointId::from_parts(index, slot.generation);
        slot.endpoint = Some(Arc::new(Mutex::new(Endpoint::new(id, owner, self.depth))));
        debug!("[IPC] {} created for pid {}", id, owner);
        Ok(id)
    }

    /// Resolve an id to its endpoint.
    ///
    /// Ids from destroyed endpoints fail with `Enoent` even when the slot
    /// has been reused.
    pub fn get(&self, id: EndpointId) -> Result<SharedEndpoint, SyscallError> {
        let index = id.index().ok_or(SyscallError::Enoent)?;
        let slots = self.slots.read();
        let slot = slots.get(index).ok_or(SyscallError::Enoent)?;
        if slot.generation != id.generation() {
            return Err(SyscallError::Enoent);
        }
        slot.endpoint.clone().ok_or(SyscallError::Enoent)
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.get(id).is_ok()
    }

    /// Owner of a live endpoint.
    pub fn owner_of(&self, id: EndpointId) -> Result<Pid, SyscallError> {
        Ok(self.get(id)?.lock().owner())
    }

    /// Number of live endpoints.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| s.endpoint.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy an endpoint, discarding its pending messages.
    ///
    /// Returns the number of messages discarded.
    pub fn destroy(&self, id: EndpointId) -> Result<usize, SyscallError> {
        let index = id.index().ok_or(SyscallError::Enoent)?;
        let endpoint = {
            let mut slots = self.slots.write();
            let slot = slots.get_mut(index).ok_or(SyscallError::Enoent)?;
            if slot.generation != id.generation() || slot.endpoint.is_none() {
                return Err(SyscallError::Enoent);
            }
            slot.generation = slot.generation.wrapping_add(1);
            slot.endpoint.take().ok_or(SyscallError::Enoent)?
        };
        let dropped = endpoint.lock().close();
        debug!("[IPC] {} destroyed, {} pending dropped", id, dropped);
        Ok(dropped)
    }

    /// Ids of every live endpoint owned by `owner`.
    pub fn owned_by(&self, owner: Pid) -> Vec<EndpointId> {
        self.slots
            .read()
            .iter()
            .filter_map(|s| s.endpoint.as_ref())
            .map(|ep| ep.lock())
            .filter(|ep| ep.owner() == owner)
            .map(|ep| ep.id())
            .collect()
    }

    /// Enqueue a message, retrying until `deadline` while the queue is full.
    ///
    /// # Errors
    /// - `Enoent` for an unknown or destroyed endpoint
    /// - `Eagain` if the queue is full and `deadline` is a poll
    /// - `Etimedout` if the queue stayed full until `deadline`
    pub fn send<C: Clock + ?Sized>(
        &self,
        id: EndpointId,
        msg: Message,
        deadline: Deadline,
        clock: &C,
    ) -> Result<(), SyscallError> {
        let sender = msg.sender();
        let mut msg = msg;
        loop {
            let endpoint = self.get(id)?;
            let attempt = endpoint.lock().try_push(msg);
            match attempt {
                Ok(()) => {
                    trace!("[IPC] {} <- pid {}", id, sender);
                    return Ok(());
                }
                Err((SyscallError::Eagain, back)) if !deadline.is_poll() => {
                    if deadline.expired(clock) {
                        return Err(SyscallError::Etimedout);
                    }
                    msg = back;
                    clock.relax();
                }
                Err((err, _)) => return Err(err),
            }
        }
    }

    /// Dequeue the oldest message that fits `capacity`, on behalf of `caller`.
    ///
    /// # Errors
    /// - `Enoent` for an unknown or destroyed endpoint
    /// - `Eperm` if `caller` does not own the endpoint
    /// - `Enomsg` if nothing is pending and `deadline` is a poll
    /// - `Emsgsize` if the oldest message is longer than `capacity`
    /// - `Etimedout` if nothing arrived before `deadline`
    pub fn recv<C: Clock + ?Sized>(
        &self,
        id: EndpointId,
        caller: Pid,
        capacity: usize,
        deadline: Deadline,
        clock: &C,
    ) -> Result<Message, SyscallError> {
        loop {
            let endpoint = self.get(id)?;
            let attempt = {
                let mut ep = endpoint.lock();
                if ep.owner() != caller {
                    return Err(SyscallError::Eperm);
                }
                ep.pop_fitting(capacity)
            };
            match attempt {
                Err(SyscallError::Enomsg) if !deadline.is_poll() => {
                    if deadline.expired(clock) {
                        return Err(SyscallError::Etimedout);
                    }
                    clock.relax();
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{TickCounter, Timeout};

    const OWNER: Pid = Pid::new(1);
    const OTHER: Pid = Pid::new(2);

    fn poll(clock: &TickCounter) -> Deadline {
        Deadline::after(clock, Timeout::Poll)
    }

    /// Clock that advances one tick every time a waiter relaxes.
    struct SteppingClock(TickCounter);

    impl Clock for SteppingClock {
        fn now(&self) -> u64 {
            self.0.now()
        }

        fn relax(&self) {
            self.0.tick();
        }
    }

    #[test]
    fn test_create_until_full() {
        let table = EndpointTable::new(2, 4);
        let a = table.create(OWNER, 8).unwrap();
        let b = table.create(OWNER, 8).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.create(OWNER, 8), Err(SyscallError::Enospc));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_quota_is_per_owner() {
        let table = EndpointTable::new(8, 4);
        table.create(OWNER, 2).unwrap();
        table.create(OWNER, 2).unwrap();
        assert_eq!(table.create(OWNER, 2), Err(SyscallError::Enospc));
        assert!(table.create(OTHER, 2).is_ok());
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let table = EndpointTable::new(1, 4);
        let old = table.create(OWNER, 8).unwrap();
        table.destroy(old).unwrap();
        let new = table.create(OWNER, 8).unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(table.get(old).unwrap_err(), SyscallError::Enoent);
        assert!(table.contains(new));
        assert_eq!(table.destroy(old), Err(SyscallError::Enoent));
    }

    #[test]
    fn test_send_recv_poll() {
        let clock = TickCounter::new();
        let table = EndpointTable::new(4, 2);
        let ep = table.create(OWNER, 8).unwrap();

        table
            .send(ep, Message::new(OTHER, b"hi".to_vec()), poll(&clock), &clock)
            .unwrap();
        table
            .send(ep, Message::new(OTHER, b"yo".to_vec()), poll(&clock), &clock)
            .unwrap();
        assert_eq!(
            table.send(ep, Message::new(OTHER, b"no".to_vec()), poll(&clock), &clock),
            Err(SyscallError::Eagain)
        );

        let m = table.recv(ep, OWNER, 16, poll(&clock), &clock).unwrap();
        assert_eq!(m.payload(), b"hi");
        assert_eq!(m.sender(), OTHER);
    }

    #[test]
    fn test_recv_requires_owner() {
        let clock = TickCounter::new();
        let table = EndpointTable::new(4, 2);
        let ep = table.create(OWNER, 8).unwrap();
        assert_eq!(
            table.recv(ep, OTHER, 16, poll(&clock), &clock).unwrap_err(),
            SyscallError::Eperm
        );
    }

    #[test]
    fn test_recv_times_out() {
        let clock = SteppingClock(TickCounter::new());
        let table = EndpointTable::new(4, 2);
        let ep = table.create(OWNER, 8).unwrap();
        let deadline = Deadline::after(&clock, Timeout::Ticks(5));
        assert_eq!(
            table.recv(ep, OWNER, 16, deadline, &clock).unwrap_err(),
            SyscallError::Etimedout
        );
        assert!(clock.now() >= 5);
    }

    #[test]
    fn test_send_times_out_when_full() {
        let clock = SteppingClock(TickCounter::new());
        let table = EndpointTable::new(4, 1);
        let ep = table.create(OWNER, 8).unwrap();
        table
            .send(ep, Message::new(OTHER, b"a".to_vec()), Deadline::after(&clock, Timeout::Poll), &clock)
            .unwrap();
        let deadline = Deadline::after(&clock, Timeout::Ticks(3));
        assert_eq!(
            table.send(ep, Message::new(OTHER, b"b".to_vec()), deadline, &clock),
            Err(SyscallError::Etimedout)
        );
        let m = table
            .recv(ep, OWNER, 16, Deadline::after(&clock, Timeout::Poll), &clock)
            .unwrap();
        assert_eq!(m.payload(), b"a");
    }

    #[test]
    fn test_owned_by() {
        let table = EndpointTable::new(4, 2);
        let a = table.create(OWNER, 8).unwrap();
        let b = table.create(OTHER, 8).unwrap();
        let c = table.create(OWNER, 8).unwrap();
        assert_eq!(table.owned_by(OWNER), alloc::vec![a, c]);
        table.destroy(a).unwrap();
        assert_eq!(table.owned_by(OWNER), alloc::vec![c]);
        assert_eq!(table.owned_by(OTHER), alloc::vec![b]);
        assert_eq!(table.owner_of(a), Err(SyscallError::Enoent));
    }

    #[test]
    fn test_concurrent_senders_keep_per_sender_order() {
        use std::thread;

        const PER_SENDER: u8 = 50;
        let clock = Arc::new(TickCounter::new());
        let table = Arc::new(EndpointTable::new(4, 4));
        let ep = table.create(OWNER, 8).unwrap();

        let senders: Vec<_> = (0..3u8)
            .map(|s| {
                let table = Arc::clone(&table);
                let clock = Arc::clone(&clock);
                thread::spawn(move || {
                    for seq in 0..PER_SENDER {
                        let msg = Message::new(Pid::new(10 + s as u32), alloc::vec![s, seq]);
                        let deadline = Deadline::after(&*clock, Timeout::Ticks(u64::MAX));
                        table.send(ep, msg, deadline, &*clock).unwrap();
                    }
                })
            })
            .collect();

        let mut next = [0u8; 3];
        let mut received = 0;
        while received < 3 * PER_SENDER as usize {
            match table.recv(ep, OWNER, 8, Deadline::after(&*clock, Timeout::Poll), &*clock) {
                Ok(m) => {
                    let (s, seq) = (m.payload()[0] as usize, m.payload()[1]);
                    assert_eq!(seq, next[s]);
                    next[s] += 1;
                    received += 1;
                }
                Err(SyscallError::Enomsg) => thread::yield_now(),
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        for h in senders {
            h.join().unwrap();
        }
        assert_eq!(next, [PER_SENDER; 3]);
    }
}
