/// Device runtime: hosts one device on a bus tap as a live event loop.
///
/// The runtime owns the `Device` and its `BusTap` and exposes a
/// channel-based API, so the application never touches frames, actions, or
/// dispatch. One task owns all mutable state; frames and commands are
/// serialized by construction.
mod r#loop;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use lares_bus::{BusTap, GroupAddress, IndividualAddress};

use crate::{Device, LaresError, Value, ValueChange};

// ── Configuration ────────────────────────────────────────────────────────

/// One startup binding: datapoint name to group address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub datapoint: String,
    pub group: GroupAddress,
}

/// Configuration for the device runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Bindings applied when the loop starts, before any frame is taken.
    /// Links with `C` and `I` issue their initial reads here.
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Capacity of the command and event channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// ── Commands (app → runtime) ─────────────────────────────────────────────

/// Commands the application sends to the runtime event loop.
pub enum RuntimeCommand {
    /// Assign a value to a datapoint.
    SetValue { name: String, value: Value },
    /// Query a datapoint's current value.
    GetValue {
        name: String,
        reply: oneshot::Sender<Option<Value>>,
    },
    /// Bind a datapoint's link to a group.
    Bind { name: String, group: GroupAddress },
    /// Unbind a datapoint's link.
    Unbind { name: String },
    /// Graceful shutdown.
    Shutdown,
}

// ── Events (runtime → app) ───────────────────────────────────────────────

/// Device-level events the application may want to observe.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A datapoint committed a new value (locally or bus-induced).
    ValueChanged { change: ValueChange },
    /// A link could not decode an inbound frame; its datapoint kept its
    /// value. One event per failing link.
    DecodeFailed {
        group: GroupAddress,
        datapoint: String,
        reason: String,
    },
    /// A command could not be applied (unknown datapoint, type mismatch).
    CommandFailed { description: String },
    /// The bus went away; the loop is exiting.
    Detached,
}

// ── RuntimeHandle (app-facing API) ───────────────────────────────────────

/// Handle to communicate with a running device runtime.
///
/// Cheap to clone. All methods are channel sends.
#[derive(Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::Sender<RuntimeCommand>,
    address: IndividualAddress,
}

impl RuntimeHandle {
    /// The device's individual address on the bus.
    pub fn address(&self) -> IndividualAddress {
        self.address
    }

    /// Assign a value to a datapoint. Transmission, if any, is decided by
    /// the link's flags; application-level failures surface as
    /// [`DeviceEvent::CommandFailed`].
    pub async fn set_value(&self, name: impl Into<String>, value: Value) -> Result<(), LaresError> {
        self.cmd_tx
            .send(RuntimeCommand::SetValue {
                name: name.into(),
                value,
            })
            .await
            .map_err(|_| LaresError::RuntimeShutDown)
    }

    /// Read a datapoint's current value. `None` for unknown names or a
    /// stopped runtime.
    pub async fn value(&self, name: impl Into<String>) -> Option<Value> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(RuntimeCommand::GetValue {
                name: name.into(),
                reply: tx,
            })
            .await;
        rx.await.ok().flatten()
    }

    /// Bind a datapoint's link to a group.
    pub async fn bind(
        &self,
        name: impl Into<String>,
        group: GroupAddress,
    ) -> Result<(), LaresError> {
        self.cmd_tx
            .send(RuntimeCommand::Bind {
                name: name.into(),
                group,
            })
            .await
            .map_err(|_| LaresError::RuntimeShutDown)
    }

    /// Unbind a datapoint's link.
    pub async fn unbind(&self, name: impl Into<String>) -> Result<(), LaresError> {
        self.cmd_tx
            .send(RuntimeCommand::Unbind { name: name.into() })
            .await
            .map_err(|_| LaresError::RuntimeShutDown)
    }

    /// Graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(RuntimeCommand::Shutdown).await;
    }
}

// ── RuntimeChannels ──────────────────────────────────────────────────────

/// Channels returned to the application when the runtime starts.
pub struct RuntimeChannels {
    /// Handle to send commands to the runtime.
    pub handle: RuntimeHandle,
    /// Receive device-level events.
    pub events: mpsc::Receiver<DeviceEvent>,
}

// ── DeviceRuntime ────────────────────────────────────────────────────────

/// Entry point for hosting a device: spawn it and communicate via channels.
pub struct DeviceRuntime;

impl DeviceRuntime {
    /// Start the runtime for `device` on `tap`.
    ///
    /// Takes ownership of both. Returns channels for the application and
    /// spawns the event loop as a tokio task.
    pub fn spawn(device: Device, tap: BusTap, config: RuntimeConfig) -> RuntimeChannels {
        let address = tap.address();

        let (cmd_tx, cmd_rx) = mpsc::channel::<RuntimeCommand>(config.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel::<DeviceEvent>(config.channel_capacity);

        tokio::spawn(r#loop::runtime_loop(device, tap, config, cmd_rx, event_tx));

        RuntimeChannels {
            handle: RuntimeHandle { cmd_tx, address },
            events: event_rx,
        }
    }
}
