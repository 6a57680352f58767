use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BusError;

/// Transmission priority class for a group frame.
///
/// Sorts in arbitration order, highest precedence first:
/// System < Urgent < Normal < Low. The class is attached to every outbound
/// frame for the benefit of arbitrating drivers; it is never consulted when
/// accepting inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    System = 0,
    Urgent = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    /// Arbitration rank. Lower wins the bus.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::System => "system",
            Priority::Urgent => "urgent",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Priority::System),
            "urgent" => Ok(Priority::Urgent),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(BusError::UnknownPriority(other.to_string())),
        }
    }
}
