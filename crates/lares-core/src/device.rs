/// Device assembly and frame dispatch.
///
/// A device is a named set of datapoints, some of them wired to groups
/// through links. `DeviceConfig` is the explicit, validated path from
/// configuration to a running `Device`: declare datapoints, declare links,
/// `build()`. Everything that can be wrong with a configuration fails
/// there, not later on the bus.
use serde::{Deserialize, Serialize};

use lares_bus::{FrameService, GroupAddress, GroupFrame};

use crate::datapoint::ListenerId;
use crate::{
    Access, BusAction, Datapoint, Flags, GroupLink, LaresError, Priority, Value, ValueChange,
    ValueKind,
};

// ── Configuration ────────────────────────────────────────────────────────

/// One datapoint declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatapointConfig {
    pub name: String,
    pub kind: ValueKind,
    pub access: Access,
    /// Starting value; the kind's zero value when omitted.
    #[serde(default)]
    pub default: Option<Value>,
}

impl DatapointConfig {
    pub fn new(name: impl Into<String>, kind: ValueKind, access: Access) -> Self {
        Self {
            name: name.into(),
            kind,
            access,
            default: None,
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// One group link declaration, referencing a datapoint by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub datapoint: String,
    #[serde(default)]
    pub flags: Flags,
    #[serde(default)]
    pub priority: Priority,
}

impl LinkConfig {
    /// Link with the customary defaults (flags `CWTU`, priority low).
    pub fn new(datapoint: impl Into<String>) -> Self {
        Self {
            datapoint: datapoint.into(),
            flags: Flags::default(),
            priority: Priority::default(),
        }
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Declarative device description; `build()` turns it into a `Device`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub datapoints: Vec<DatapointConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            datapoints: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn datapoint(mut self, dp: DatapointConfig) -> Self {
        self.datapoints.push(dp);
        self
    }

    pub fn link(mut self, link: LinkConfig) -> Self {
        self.links.push(link);
        self
    }

    /// Validate and assemble.
    ///
    /// Rejected here: duplicate datapoint names, a default value of the
    /// wrong kind, a link referencing an unknown datapoint, two links on
    /// one datapoint.
    pub fn build(self) -> Result<Device, LaresError> {
        let mut datapoints = Vec::new();
        for dp in self.datapoints {
            if datapoints.iter().any(|d: &Datapoint| d.name() == dp.name) {
                return Err(LaresError::DuplicateDatapoint { name: dp.name });
            }
            let initial = dp.default.unwrap_or_else(|| dp.kind.default_value());
            datapoints.push(Datapoint::new(dp.name, dp.kind, dp.access, initial)?);
        }

        let mut links: Vec<GroupLink> = Vec::new();
        for lc in self.links {
            if links.iter().any(|l| l.name() == lc.datapoint) {
                return Err(LaresError::DuplicateLink {
                    datapoint: lc.datapoint,
                });
            }
            let at = datapoints
                .iter()
                .position(|d| d.name() == lc.datapoint)
                .ok_or(LaresError::UnknownDatapoint {
                    name: lc.datapoint.clone(),
                })?;
            links.push(GroupLink::new(datapoints.remove(at), lc.flags, lc.priority));
        }

        tracing::debug!(
            "device {}: {} links, {} local datapoints",
            self.name,
            links.len(),
            datapoints.len()
        );
        Ok(Device {
            name: self.name,
            description: self.description,
            links,
            locals: datapoints,
        })
    }
}

// ── Device ───────────────────────────────────────────────────────────────

/// A built device: linked datapoints plus purely local ones.
///
/// The device is the dispatch point for inbound frames: a frame reaches
/// every link bound to its group, and the decided actions bubble back to
/// the caller for execution. Dropping the device tears down every link and
/// subscription with it.
#[derive(Debug)]
pub struct Device {
    name: String,
    description: Option<String>,
    links: Vec<GroupLink>,
    locals: Vec<Datapoint>,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Look a datapoint up by name, linked or local.
    pub fn datapoint(&self, name: &str) -> Option<&Datapoint> {
        self.links
            .iter()
            .map(GroupLink::datapoint)
            .chain(self.locals.iter())
            .find(|d| d.name() == name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.datapoint(name).map(Datapoint::value)
    }

    pub fn link(&self, name: &str) -> Option<&GroupLink> {
        self.links.iter().find(|l| l.name() == name)
    }

    pub fn links(&self) -> impl Iterator<Item = &GroupLink> {
        self.links.iter()
    }

    pub fn datapoints(&self) -> impl Iterator<Item = &Datapoint> {
        self.links
            .iter()
            .map(GroupLink::datapoint)
            .chain(self.locals.iter())
    }

    // ── Local side ───────────────────────────────────────────────────────

    /// Assign a value by datapoint name. Linked datapoints go through the
    /// transmit gate; local ones just commit.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<Vec<BusAction>, LaresError> {
        if let Some(link) = self.links.iter_mut().find(|l| l.name() == name) {
            return link.set_value(value);
        }
        if let Some(dp) = self.locals.iter_mut().find(|d| d.name() == name) {
            dp.set_value(value)?;
            return Ok(vec![]);
        }
        Err(LaresError::UnknownDatapoint {
            name: name.to_string(),
        })
    }

    /// Register a change subscriber on a datapoint.
    pub fn subscribe(
        &mut self,
        name: &str,
        listener: impl FnMut(&ValueChange) + Send + 'static,
    ) -> Result<ListenerId, LaresError> {
        if let Some(link) = self.links.iter_mut().find(|l| l.name() == name) {
            return Ok(link.subscribe(listener));
        }
        if let Some(dp) = self.locals.iter_mut().find(|d| d.name() == name) {
            return Ok(dp.subscribe(listener));
        }
        Err(LaresError::UnknownDatapoint {
            name: name.to_string(),
        })
    }

    pub fn unsubscribe(&mut self, name: &str, id: ListenerId) -> Result<bool, LaresError> {
        if let Some(link) = self.links.iter_mut().find(|l| l.name() == name) {
            return Ok(link.unsubscribe(id));
        }
        if let Some(dp) = self.locals.iter_mut().find(|d| d.name() == name) {
            return Ok(dp.unsubscribe(id));
        }
        Err(LaresError::UnknownDatapoint {
            name: name.to_string(),
        })
    }

    // ── Weaving ──────────────────────────────────────────────────────────

    /// Bind a linked datapoint to a group, replacing any prior binding.
    pub fn bind(&mut self, name: &str, group: GroupAddress) -> Result<Vec<BusAction>, LaresError> {
        let link = self.link_mut(name)?;
        Ok(link.bind(group))
    }

    /// Detach a linked datapoint from its group.
    pub fn unbind(&mut self, name: &str) -> Result<Option<GroupAddress>, LaresError> {
        let link = self.link_mut(name)?;
        Ok(link.unbind())
    }

    fn link_mut(&mut self, name: &str) -> Result<&mut GroupLink, LaresError> {
        if let Some(link) = self.links.iter_mut().find(|l| l.name() == name) {
            return Ok(link);
        }
        if self.locals.iter().any(|d| d.name() == name) {
            return Err(LaresError::NotLinked {
                name: name.to_string(),
            });
        }
        Err(LaresError::UnknownDatapoint {
            name: name.to_string(),
        })
    }

    // ── Bus side ─────────────────────────────────────────────────────────

    /// Dispatch an inbound frame to every link bound to its group.
    ///
    /// Frames for groups nobody here is bound to fall through silently;
    /// that is normal traffic on a shared bus. Links are dispatched
    /// independently: a decode failure leaves the failing link's datapoint
    /// untouched and is reported per link, while the other links still see
    /// the frame and their commits and actions survive.
    pub fn handle_frame(&mut self, frame: &GroupFrame) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for link in self
            .links
            .iter_mut()
            .filter(|l| l.group() == Some(frame.group))
        {
            let decided = match &frame.service {
                FrameService::Write(payload) => link.handle_write(frame.src, payload),
                FrameService::Read => Ok(link.handle_read(frame.src)),
                FrameService::Response(payload) => link.handle_response(frame.src, payload),
            };
            match decided {
                Ok(actions) => outcome.actions.extend(actions),
                Err(error) => outcome.failures.push(DispatchFailure {
                    datapoint: link.name().to_string(),
                    error,
                }),
            }
        }
        outcome
    }
}

// ── Dispatch outcome ─────────────────────────────────────────────────────

/// What one frame's dispatch produced across the links bound to its group.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Actions decided by the links that accepted the frame.
    pub actions: Vec<BusAction>,
    /// Per-link failures; each names the failing link's datapoint.
    pub failures: Vec<DispatchFailure>,
}

/// One link's refusal to take a frame, keyed by its datapoint.
#[derive(Debug)]
pub struct DispatchFailure {
    pub datapoint: String,
    pub error: LaresError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lares_bus::IndividualAddress;

    fn gad(s: &str) -> GroupAddress {
        s.parse().expect("valid group")
    }

    fn peer() -> IndividualAddress {
        "1.1.9".parse().expect("valid address")
    }

    fn flags(s: &str) -> Flags {
        s.parse().expect("valid flags")
    }

    /// A two-way lamp controller: a command output, a state mirror, and a
    /// local-only counter.
    fn lamp_device() -> Device {
        DeviceConfig::new("lamp")
            .description("ceiling lamp controller")
            .datapoint(DatapointConfig::new("cmd", ValueKind::Bool, Access::Output))
            .datapoint(DatapointConfig::new("state", ValueKind::Bool, Access::Input))
            .datapoint(DatapointConfig::new("switch_count", ValueKind::Uint16, Access::Output))
            .link(LinkConfig::new("cmd").flags(flags("CWT")))
            .link(LinkConfig::new("state").flags(flags("CWUI")))
            .build()
            .expect("valid device")
    }

    #[test]
    fn test_build_assembles_links_and_locals() {
        let device = lamp_device();
        assert_eq!(device.name(), "lamp");
        assert_eq!(device.description(), Some("ceiling lamp controller"));
        assert_eq!(device.links().count(), 2);
        assert_eq!(device.datapoints().count(), 3);
        assert!(device.link("cmd").is_some());
        assert!(device.link("switch_count").is_none());
        assert_eq!(device.value("switch_count"), Some(&Value::Uint16(0)));
    }

    #[test]
    fn test_build_rejects_duplicate_datapoint() {
        let err = DeviceConfig::new("dup")
            .datapoint(DatapointConfig::new("cmd", ValueKind::Bool, Access::Output))
            .datapoint(DatapointConfig::new("cmd", ValueKind::Uint8, Access::Input))
            .build();
        assert!(matches!(
            err,
            Err(LaresError::DuplicateDatapoint { name }) if name == "cmd"
        ));
    }

    #[test]
    fn test_build_rejects_link_to_unknown_datapoint() {
        let err = DeviceConfig::new("dangling")
            .link(LinkConfig::new("ghost"))
            .build();
        assert!(matches!(
            err,
            Err(LaresError::UnknownDatapoint { name }) if name == "ghost"
        ));
    }

    #[test]
    fn test_build_rejects_second_link_on_datapoint() {
        let err = DeviceConfig::new("twice")
            .datapoint(DatapointConfig::new("cmd", ValueKind::Bool, Access::Output))
            .link(LinkConfig::new("cmd"))
            .link(LinkConfig::new("cmd").flags(flags("CR")))
            .build();
        assert!(matches!(
            err,
            Err(LaresError::DuplicateLink { datapoint }) if datapoint == "cmd"
        ));
    }

    #[test]
    fn test_build_rejects_default_of_wrong_kind() {
        let err = DeviceConfig::new("typo")
            .datapoint(
                DatapointConfig::new("cmd", ValueKind::Bool, Access::Output)
                    .default_value(Value::Uint8(1)),
            )
            .build();
        assert!(matches!(err, Err(LaresError::TypeMismatch { .. })));
    }

    #[test]
    fn test_explicit_default_value() {
        let device = DeviceConfig::new("warm")
            .datapoint(
                DatapointConfig::new("setpoint", ValueKind::Float32, Access::Output)
                    .default_value(Value::Float32(21.5)),
            )
            .build()
            .expect("valid device");
        assert_eq!(device.value("setpoint"), Some(&Value::Float32(21.5)));
    }

    #[test]
    fn test_set_value_routes_through_the_link() {
        let mut device = lamp_device();
        device.bind("cmd", gad("6/0/1")).expect("bind");

        let actions = device.set_value("cmd", Value::Bool(true)).expect("set");
        assert_eq!(actions.len(), 1, "cmd transmits");

        let actions = device
            .set_value("switch_count", Value::Uint16(1))
            .expect("set");
        assert!(actions.is_empty(), "local datapoint stays local");

        assert!(matches!(
            device.set_value("nope", Value::Bool(true)),
            Err(LaresError::UnknownDatapoint { .. })
        ));
    }

    #[test]
    fn test_bind_refuses_unlinked_datapoint() {
        let mut device = lamp_device();
        assert!(matches!(
            device.bind("switch_count", gad("1/0/1")),
            Err(LaresError::NotLinked { .. })
        ));
        assert!(matches!(
            device.bind("nope", gad("1/0/1")),
            Err(LaresError::UnknownDatapoint { .. })
        ));
    }

    #[test]
    fn test_bind_with_init_bubbles_the_read() {
        let mut device = lamp_device();
        let actions = device.bind("state", gad("6/0/2")).expect("bind");
        assert_eq!(
            actions,
            vec![BusAction::Read {
                group: gad("6/0/2"),
                priority: Priority::Low,
            }]
        );
        assert_eq!(device.unbind("state").expect("unbind"), Some(gad("6/0/2")));
    }

    #[test]
    fn test_frame_dispatch_reaches_the_bound_link_only() {
        let mut device = lamp_device();
        device.bind("cmd", gad("6/0/1")).expect("bind");
        device.bind("state", gad("6/0/2")).expect("bind");

        let frame = GroupFrame::write(peer(), gad("6/0/2"), Priority::Low, vec![0x01]);
        let outcome = device.handle_frame(&frame);
        assert!(outcome.actions.is_empty(), "state has no T, nothing echoes");
        assert!(outcome.failures.is_empty());
        assert_eq!(device.value("state"), Some(&Value::Bool(true)));
        assert_eq!(device.value("cmd"), Some(&Value::Bool(false)), "cmd untouched");
    }

    #[test]
    fn test_frame_for_unbound_group_falls_through() {
        let mut device = lamp_device();
        device.bind("cmd", gad("6/0/1")).expect("bind");

        let frame = GroupFrame::write(peer(), gad("5/5/5"), Priority::Low, vec![0x01]);
        let outcome = device.handle_frame(&frame);
        assert!(outcome.actions.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(device.value("cmd"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_read_frame_is_answered() {
        let mut device = DeviceConfig::new("sensor")
            .datapoint(DatapointConfig::new("temp", ValueKind::Float32, Access::Output))
            .link(LinkConfig::new("temp").flags(flags("CRT")))
            .build()
            .expect("valid device");
        device.bind("temp", gad("6/1/0")).expect("bind");
        device.set_value("temp", Value::Float32(21.5)).expect("set");

        let frame = GroupFrame::read(peer(), gad("6/1/0"), Priority::Low);
        let outcome = device.handle_frame(&frame);
        assert_eq!(
            outcome.actions,
            vec![BusAction::Respond {
                group: gad("6/1/0"),
                priority: Priority::Low,
                payload: Value::Float32(21.5).encode(),
            }]
        );
    }

    #[test]
    fn test_decode_failure_surfaces_from_dispatch() {
        let mut device = lamp_device();
        device.bind("cmd", gad("6/0/1")).expect("bind");

        let frame = GroupFrame::write(peer(), gad("6/0/1"), Priority::Low, vec![0xEE]);
        let outcome = device.handle_frame(&frame);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].datapoint, "cmd");
        assert!(matches!(outcome.failures[0].error, LaresError::Decode { .. }));
        assert_eq!(device.value("cmd"), Some(&Value::Bool(false)));
    }

    /// Two links on one group: one link's decode failure neither blocks
    /// the other's dispatch nor discards its echo.
    #[test]
    fn test_dispatch_isolates_per_link_failures() {
        let mut device = DeviceConfig::new("mixed")
            .datapoint(DatapointConfig::new("cmd", ValueKind::Bool, Access::Output))
            .datapoint(DatapointConfig::new("level", ValueKind::Uint16, Access::Input))
            .link(LinkConfig::new("cmd").flags(flags("CWT")))
            .link(LinkConfig::new("level").flags(flags("CWU")))
            .build()
            .expect("valid device");
        device.bind("cmd", gad("6/0/9")).expect("bind");
        device.bind("level", gad("6/0/9")).expect("bind");

        // One byte: fine for the bool link, short for the uint16 one.
        let frame = GroupFrame::write(peer(), gad("6/0/9"), Priority::Low, vec![0x01]);
        let outcome = device.handle_frame(&frame);

        assert_eq!(device.value("cmd"), Some(&Value::Bool(true)));
        assert_eq!(device.value("level"), Some(&Value::Uint16(0)), "short payload never lands");
        assert_eq!(outcome.actions.len(), 1, "the bool link still echoes");
        assert!(matches!(
            outcome.actions[0],
            BusAction::Write { group, .. } if group == gad("6/0/9")
        ));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].datapoint, "level");
        assert!(matches!(outcome.failures[0].error, LaresError::Decode { .. }));
    }

    #[test]
    fn test_subscribe_by_name() {
        use std::sync::{Arc, Mutex};

        let mut device = lamp_device();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let id = device
            .subscribe("cmd", move |change| {
                s.lock().unwrap().push(change.current.clone())
            })
            .expect("subscribe");

        device.set_value("cmd", Value::Bool(true)).expect("set");
        assert_eq!(*seen.lock().unwrap(), vec![Value::Bool(true)]);

        assert!(device.unsubscribe("cmd", id).expect("unsubscribe"));
        device.set_value("cmd", Value::Bool(false)).expect("set");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_config_from_json_applies_defaults() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{
                "name": "timer",
                "datapoints": [
                    {"name": "cmd", "kind": "bool", "access": "output"},
                    {"name": "delay", "kind": "uint16", "access": "input",
                     "default": {"uint16": 10}}
                ],
                "links": [
                    {"datapoint": "cmd", "flags": "CWT"},
                    {"datapoint": "delay"}
                ]
            }"#,
        )
        .expect("deserialize");

        let device = config.build().expect("valid device");
        assert_eq!(device.value("delay"), Some(&Value::Uint16(10)));
        let delay = device.link("delay").expect("linked");
        // Omitted flags and priority fall back to CWTU / low.
        assert_eq!(delay.flags(), Flags::default());
        assert_eq!(delay.priority(), Priority::Low);
        assert_eq!(device.link("cmd").expect("linked").flags(), flags("CWT"));
    }
}
