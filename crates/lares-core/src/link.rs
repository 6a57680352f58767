/// GroupLink, the mediator between one datapoint and one bus group.
///
/// Pure decision engine: every handler returns `Vec<BusAction>` for the
/// caller to execute against the bus. Handlers never touch the bus
/// themselves, so one inbound event yields at most one outbound frame and
/// an echoed write cannot loop inside the link.
///
/// Responsibilities:
/// - Gate all bus traffic on the capability flags
/// - Transmit local changes (edge-triggered, or unconditionally under `S`)
/// - Accept group writes and responses into the datapoint
/// - Answer group reads with the current value
/// - Issue the initial read when bound with `I`
use serde::{Deserialize, Serialize};

use lares_bus::{GroupAddress, IndividualAddress, Priority};

use crate::datapoint::ListenerId;
use crate::{Datapoint, Flags, LaresError, Value, ValueChange};

/// Bus side effect decided by a link. The caller executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusAction {
    /// Distribute a value to the group.
    Write {
        group: GroupAddress,
        priority: Priority,
        payload: Vec<u8>,
    },
    /// Query the group for its current value.
    Read {
        group: GroupAddress,
        priority: Priority,
    },
    /// Answer a group read.
    Respond {
        group: GroupAddress,
        priority: Priority,
        payload: Vec<u8>,
    },
}

/// One datapoint wired to at most one group.
pub struct GroupLink {
    datapoint: Datapoint,
    flags: Flags,
    priority: Priority,
    group: Option<GroupAddress>,
}

impl GroupLink {
    /// Create an unbound link. Unbound, it is a pure local observer: values
    /// move, subscribers fire, nothing reaches the bus.
    pub fn new(datapoint: Datapoint, flags: Flags, priority: Priority) -> Self {
        Self {
            datapoint,
            flags,
            priority,
            group: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        self.datapoint.name()
    }

    pub fn datapoint(&self) -> &Datapoint {
        &self.datapoint
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn group(&self) -> Option<GroupAddress> {
        self.group
    }

    pub fn is_bound(&self) -> bool {
        self.group.is_some()
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    /// Register a change subscriber on the underlying datapoint.
    pub fn subscribe(&mut self, listener: impl FnMut(&ValueChange) + Send + 'static) -> ListenerId {
        self.datapoint.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.datapoint.unsubscribe(id)
    }

    // ── Binding ──────────────────────────────────────────────────────────

    /// Attach to `group`, replacing any prior binding. With `C` and `I`
    /// both set this asks the group for its current value; the answer
    /// arrives later through `handle_response`.
    pub fn bind(&mut self, group: GroupAddress) -> Vec<BusAction> {
        self.group = Some(group);
        tracing::debug!("link {}: bound to {group} [{}]", self.name(), self.flags);
        if self.flags.communicate() && self.flags.init() {
            return vec![BusAction::Read {
                group,
                priority: self.priority,
            }];
        }
        vec![]
    }

    /// Detach from the bound group, if any. All bus-facing operations are
    /// silent no-ops afterwards.
    pub fn unbind(&mut self) -> Option<GroupAddress> {
        let group = self.group.take();
        if let Some(group) = group {
            tracing::debug!("link {}: unbound from {group}", self.name());
        }
        group
    }

    // ── Local side ───────────────────────────────────────────────────────

    /// Commit a local mutation, then decide transmission.
    pub fn set_value(&mut self, value: Value) -> Result<Vec<BusAction>, LaresError> {
        let change = self.datapoint.set_value(value)?;
        Ok(self.transmit(&change))
    }

    /// The transmit gate: one `Write` iff the link is bound, `C` is set,
    /// and the change is a real edge (or `S` waives edge detection).
    fn transmit(&self, change: &ValueChange) -> Vec<BusAction> {
        let Some(group) = self.group else {
            return vec![]; // local observer until bound
        };
        if !self.flags.communicate() {
            return vec![];
        }
        if (self.flags.transmit() && change.changed()) || self.flags.stateless() {
            tracing::debug!(
                "link {}: transmit {} on {group}",
                self.name(),
                change.current
            );
            return vec![BusAction::Write {
                group,
                priority: self.priority,
                payload: change.current.encode(),
            }];
        }
        vec![]
    }

    // ── Bus side ─────────────────────────────────────────────────────────

    /// Accept a group write. `W` alone gates acceptance; `C` is not
    /// required here. The induced change runs through the transmit gate,
    /// so an accepted write that moves the value echoes exactly once.
    ///
    /// Decode failure leaves the datapoint untouched and propagates.
    pub fn handle_write(
        &mut self,
        src: IndividualAddress,
        payload: &[u8],
    ) -> Result<Vec<BusAction>, LaresError> {
        if self.group.is_none() {
            return Ok(vec![]);
        }
        if !self.flags.write() {
            tracing::debug!("link {}: write from {src} ignored (no W)", self.name());
            return Ok(vec![]);
        }
        let value = self.datapoint.decode(payload)?;
        let change = self.datapoint.set_value(value)?;
        tracing::debug!("link {}: write from {src} accepted", self.name());
        Ok(self.transmit(&change))
    }

    /// Answer a group read with the current value. Needs `C` and `R`.
    pub fn handle_read(&self, src: IndividualAddress) -> Vec<BusAction> {
        let Some(group) = self.group else {
            return vec![];
        };
        if !self.flags.communicate() || !self.flags.read() {
            tracing::debug!("link {}: read from {src} ignored", self.name());
            return vec![];
        }
        vec![BusAction::Respond {
            group,
            priority: self.priority,
            payload: self.datapoint.encode(),
        }]
    }

    /// Accept a group response (typically the answer to our own init
    /// read). `U` alone gates acceptance; same mutation, echo, and decode
    /// rules as `handle_write`.
    pub fn handle_response(
        &mut self,
        src: IndividualAddress,
        payload: &[u8],
    ) -> Result<Vec<BusAction>, LaresError> {
        if self.group.is_none() {
            return Ok(vec![]);
        }
        if !self.flags.update() {
            tracing::debug!("link {}: response from {src} ignored (no U)", self.name());
            return Ok(vec![]);
        }
        let value = self.datapoint.decode(payload)?;
        let change = self.datapoint.set_value(value)?;
        tracing::debug!("link {}: response from {src} accepted", self.name());
        Ok(self.transmit(&change))
    }
}

impl std::fmt::Debug for GroupLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupLink")
            .field("name", &self.name())
            .field("flags", &self.flags)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .finish()
    }
}
