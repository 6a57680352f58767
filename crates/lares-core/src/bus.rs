use lares_bus::{GroupAddress, Priority};

use crate::{BusAction, LaresError};

/// Bus abstraction the mediation layer writes through.
///
/// In production: implemented by `lares_bus::BusTap`.
/// In tests: implemented by `MockBus` (records the calls).
pub trait GroupBus: Send {
    /// Distribute a value to a group.
    fn write(
        &self,
        group: GroupAddress,
        priority: Priority,
        payload: &[u8],
    ) -> Result<(), LaresError>;

    /// Query a group for its current value.
    fn read(&self, group: GroupAddress, priority: Priority) -> Result<(), LaresError>;

    /// Answer a group read.
    fn respond(
        &self,
        group: GroupAddress,
        priority: Priority,
        payload: &[u8],
    ) -> Result<(), LaresError>;
}

/// Execute decided actions against a bus, in order.
pub fn execute_actions(bus: &impl GroupBus, actions: Vec<BusAction>) -> Result<(), LaresError> {
    for action in actions {
        match action {
            BusAction::Write {
                group,
                priority,
                payload,
            } => bus.write(group, priority, &payload)?,
            BusAction::Read { group, priority } => bus.read(group, priority)?,
            BusAction::Respond {
                group,
                priority,
                payload,
            } => bus.respond(group, priority, &payload)?,
        }
    }
    Ok(())
}

// ── Impl for BusTap (production) ─────────────────────────────────────────

impl GroupBus for lares_bus::BusTap {
    fn write(
        &self,
        group: GroupAddress,
        priority: Priority,
        payload: &[u8],
    ) -> Result<(), LaresError> {
        lares_bus::BusTap::write(self, group, priority, payload.to_vec()).map_err(Into::into)
    }

    fn read(&self, group: GroupAddress, priority: Priority) -> Result<(), LaresError> {
        lares_bus::BusTap::read(self, group, priority).map_err(Into::into)
    }

    fn respond(
        &self,
        group: GroupAddress,
        priority: Priority,
        payload: &[u8],
    ) -> Result<(), LaresError> {
        lares_bus::BusTap::respond(self, group, priority, payload.to_vec()).map_err(Into::into)
    }
}

// ── MockBus (tests) ──────────────────────────────────────────────────────
