/// In-process group bus.
///
/// `LocalBus` is a loopback driver for wiring devices that live in the same
/// process: every attached tap sees every frame sent by any other tap. It
/// performs no arbitration (frames are delivered in send order; the
/// priority class rides along as a tag) and no byte framing.
///
/// The bus lives as long as a `LocalBus` handle does. `close()` or dropping
/// the last handle detaches every tap: pending frames stay readable, then
/// `recv()` reports the end of the stream.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;

use crate::{BusError, GroupAddress, GroupFrame, IndividualAddress, Priority};

/// Shared in-process bus. Cheap to clone; clones share the tap table.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    taps: HashMap<IndividualAddress, TapEntry>,
    next_id: u64,
    closed: bool,
}

/// A tap's registration. The id tells a stale tap apart from a newer one
/// that re-attached under the same address.
struct TapEntry {
    id: u64,
    tx: mpsc::UnboundedSender<GroupFrame>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().expect("bus state poisoned")
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device under its individual address.
    ///
    /// Fails if the address is already on the bus or the bus is closed. The
    /// tap detaches itself when dropped, so the address becomes free again.
    pub fn attach(&self, addr: IndividualAddress) -> Result<BusTap, BusError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(BusError::Closed);
        }
        if inner.taps.contains_key(&addr) {
            return Err(BusError::AlreadyAttached(addr));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.taps.insert(addr, TapEntry { id, tx });
        tracing::debug!("bus: tap {addr} attached");
        Ok(BusTap {
            addr,
            id,
            bus: Arc::downgrade(&self.inner),
            rx,
        })
    }

    /// Close the bus: detach every tap and refuse further attachments.
    ///
    /// Frames already queued stay readable; after the drain every tap's
    /// `recv()` returns `None`.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.taps.clear();
        tracing::debug!("bus: closed");
    }

    /// Number of devices currently on the bus.
    pub fn tap_count(&self) -> usize {
        self.lock().taps.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

/// A device's endpoint on a [`LocalBus`].
///
/// Sending is synchronous (frames land in the other taps' queues before the
/// call returns); receiving works from both sync and async contexts. A tap
/// holds no strong handle to the bus; dropping the last `LocalBus` ends
/// every tap's stream.
pub struct BusTap {
    addr: IndividualAddress,
    id: u64,
    bus: Weak<Mutex<Inner>>,
    rx: mpsc::UnboundedReceiver<GroupFrame>,
}

impl BusTap {
    pub fn address(&self) -> IndividualAddress {
        self.addr
    }

    /// Distribute a value to a group.
    pub fn write(
        &self,
        group: GroupAddress,
        priority: Priority,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        self.broadcast(GroupFrame::write(self.addr, group, priority, payload))
    }

    /// Query a group for its current value.
    pub fn read(&self, group: GroupAddress, priority: Priority) -> Result<(), BusError> {
        self.broadcast(GroupFrame::read(self.addr, group, priority))
    }

    /// Answer a read on a group.
    pub fn respond(
        &self,
        group: GroupAddress,
        priority: Priority,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        self.broadcast(GroupFrame::response(self.addr, group, priority, payload))
    }

    /// Wait for the next frame from the bus. `None` once this tap is
    /// detached (or the bus closed or dropped) and the queue is drained.
    pub async fn recv(&mut self) -> Option<GroupFrame> {
        self.rx.recv().await
    }

    /// Pull the next pending frame without waiting.
    pub fn try_recv(&mut self) -> Option<GroupFrame> {
        self.rx.try_recv().ok()
    }

    /// Fan a frame out to every tap except the sender. Taps whose receiver
    /// is gone are pruned on the way.
    fn broadcast(&self, frame: GroupFrame) -> Result<(), BusError> {
        let Some(bus) = self.bus.upgrade() else {
            return Err(BusError::Detached(self.addr));
        };
        let mut inner = lock(&bus);
        if !inner.taps.get(&self.addr).is_some_and(|e| e.id == self.id) {
            return Err(BusError::Detached(self.addr));
        }
        let mut dead = Vec::new();
        for (addr, entry) in inner.taps.iter() {
            if *addr == self.addr {
                continue;
            }
            if entry.tx.send(frame.clone()).is_err() {
                dead.push(*addr);
            }
        }
        for addr in dead {
            inner.taps.remove(&addr);
            tracing::debug!("bus: tap {addr} vanished, pruned");
        }
        Ok(())
    }
}

impl Drop for BusTap {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut inner = lock(&bus);
        // Only remove our own registration; the address may have been
        // re-attached by a newer tap already.
        if inner.taps.get(&self.addr).is_some_and(|e| e.id == self.id) {
            inner.taps.remove(&self.addr);
            tracing::debug!("bus: tap {} detached", self.addr);
        }
    }
}
