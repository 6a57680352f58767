//! Lares mediation layer.
//!
//! Implements datapoints, communication flags, and group links on top of
//! `lares-bus`: for every local state change and every inbound bus frame,
//! the link decides whether a frame is sent, accepted, or ignored.
//!
//! The decision core is synchronous and pure (handlers return actions, the
//! caller executes them); `runtime` wraps one device and one bus tap into a
//! live tokio event loop.

pub mod bus;
pub mod datapoint;
pub mod device;
pub mod error;
pub mod flags;
pub mod link;
pub mod runtime;
pub mod value;

pub use bus::{execute_actions, GroupBus};
pub use datapoint::{Access, Datapoint, ListenerId};
pub use device::{
    DatapointConfig, Device, DeviceConfig, DispatchFailure, DispatchOutcome, LinkConfig,
};
pub use error::LaresError;
pub use flags::Flags;
pub use link::{BusAction, GroupLink};
pub use runtime::{
    Binding, DeviceEvent, DeviceRuntime, RuntimeChannels, RuntimeConfig, RuntimeHandle,
};
pub use value::{Value, ValueChange, ValueKind};

// Re-export the bus vocabulary the API surfaces.
pub use lares_bus::{
    BusError, BusTap, FrameService, GroupAddress, GroupFrame, IndividualAddress, LocalBus,
    Priority,
};
