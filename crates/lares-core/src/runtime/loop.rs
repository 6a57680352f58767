/// The device runtime event loop.
///
/// A single async task that owns the device and its bus tap and
/// multiplexes over inbound frames, application commands, and the device's
/// own change notifications.
use tokio::sync::mpsc;

use lares_bus::BusTap;

use crate::bus::execute_actions;
use crate::{Device, ValueChange};

use super::{DeviceEvent, RuntimeCommand, RuntimeConfig};

pub(super) async fn runtime_loop(
    mut device: Device,
    mut tap: BusTap,
    config: RuntimeConfig,
    mut cmd_rx: mpsc::Receiver<RuntimeCommand>,
    event_tx: mpsc::Sender<DeviceEvent>,
) {
    // ── Change notifications ────────────────────────────────────────
    // Bridge datapoint subscriptions onto a channel the loop can select.
    let (change_tx, mut change_rx) = mpsc::unbounded_channel::<ValueChange>();
    let names: Vec<String> = device.datapoints().map(|d| d.name().to_string()).collect();
    for name in names {
        let tx = change_tx.clone();
        let _ = device.subscribe(&name, move |change| {
            let _ = tx.send(change.clone());
        });
    }

    // ── Startup bindings ────────────────────────────────────────────
    for binding in &config.bindings {
        match device.bind(&binding.datapoint, binding.group) {
            Ok(actions) => {
                if let Err(e) = execute_actions(&tap, actions) {
                    tracing::warn!("init read for {} failed: {e}", binding.datapoint);
                }
            }
            Err(e) => {
                tracing::warn!("binding {} failed: {e}", binding.datapoint);
                let _ = event_tx
                    .send(DeviceEvent::CommandFailed {
                        description: e.to_string(),
                    })
                    .await;
            }
        }
    }

    tracing::info!("device {} live on {}", device.name(), tap.address());

    loop {
        tokio::select! {
            // ── 1. Inbound frames from the bus ──────────────────
            frame = tap.recv() => {
                let Some(frame) = frame else {
                    tracing::warn!("device {}: bus detached", device.name());
                    let _ = event_tx.send(DeviceEvent::Detached).await;
                    break;
                };
                tracing::debug!(
                    "device {}: {} from {} on {}",
                    device.name(),
                    frame.service.name(),
                    frame.src,
                    frame.group
                );
                let outcome = device.handle_frame(&frame);
                if let Err(e) = execute_actions(&tap, outcome.actions) {
                    tracing::warn!("device {}: bus action failed: {e}", device.name());
                }
                for failure in outcome.failures {
                    tracing::debug!(
                        "device {}: frame dropped for {}: {}",
                        device.name(),
                        failure.datapoint,
                        failure.error
                    );
                    let _ = event_tx
                        .send(DeviceEvent::DecodeFailed {
                            group: frame.group,
                            datapoint: failure.datapoint,
                            reason: failure.error.to_string(),
                        })
                        .await;
                }
            }

            // ── 2. Application commands ─────────────────────────
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break; // every handle dropped
                };
                match cmd {
                    RuntimeCommand::SetValue { name, value } => {
                        match device.set_value(&name, value) {
                            Ok(actions) => {
                                if let Err(e) = execute_actions(&tap, actions) {
                                    tracing::warn!(
                                        "device {}: bus action failed: {e}",
                                        device.name()
                                    );
                                }
                            }
                            Err(e) => {
                                tracing::debug!("set {name} failed: {e}");
                                let _ = event_tx
                                    .send(DeviceEvent::CommandFailed {
                                        description: e.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                    RuntimeCommand::GetValue { name, reply } => {
                        let _ = reply.send(device.value(&name).cloned());
                    }
                    RuntimeCommand::Bind { name, group } => {
                        match device.bind(&name, group) {
                            Ok(actions) => {
                                if let Err(e) = execute_actions(&tap, actions) {
                                    tracing::warn!("init read for {name} failed: {e}");
                                }
                            }
                            Err(e) => {
                                let _ = event_tx
                                    .send(DeviceEvent::CommandFailed {
                                        description: e.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                    RuntimeCommand::Unbind { name } => {
                        if let Err(e) = device.unbind(&name) {
                            let _ = event_tx
                                .send(DeviceEvent::CommandFailed {
                                    description: e.to_string(),
                                })
                                .await;
                        }
                    }
                    RuntimeCommand::Shutdown => {
                        break;
                    }
                }
            }

            // ── 3. Committed changes from the device ────────────
            change = change_rx.recv() => {
                let Some(change) = change else {
                    break;
                };
                let _ = event_tx.send(DeviceEvent::ValueChanged { change }).await;
            }
        }
    }

    tracing::info!("device {} runtime stopped", device.name());
}
