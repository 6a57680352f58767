use serde::{Deserialize, Serialize};

use crate::{GroupAddress, IndividualAddress, Priority};

/// Service carried by a group frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameService {
    /// Unsolicited value distribution.
    Write(Vec<u8>),
    /// Query for the group's current value.
    Read,
    /// Reply to a read.
    Response(Vec<u8>),
}

impl FrameService {
    pub fn name(&self) -> &'static str {
        match self {
            FrameService::Write(_) => "write",
            FrameService::Read => "read",
            FrameService::Response(_) => "response",
        }
    }
}

/// One telegram on the group bus.
///
/// Frames address a group, never an individual device; the source address
/// identifies the sender for diagnostics and sender-exclusion on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFrame {
    pub src: IndividualAddress,
    pub group: GroupAddress,
    pub priority: Priority,
    pub service: FrameService,
}

impl GroupFrame {
    pub fn write(
        src: IndividualAddress,
        group: GroupAddress,
        priority: Priority,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            src,
            group,
            priority,
            service: FrameService::Write(payload),
        }
    }

    pub fn read(src: IndividualAddress, group: GroupAddress, priority: Priority) -> Self {
        Self {
            src,
            group,
            priority,
            service: FrameService::Read,
        }
    }

    pub fn response(
        src: IndividualAddress,
        group: GroupAddress,
        priority: Priority,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            src,
            group,
            priority,
            service: FrameService::Response(payload),
        }
    }
}
