/// Communication capability flags for a group link.
///
/// Parsed once from the compact token string ("CWTU", "CRT", ...), immutable
/// afterwards. Tokens:
///
/// - `C` communicate: master switch for bus-facing behavior
/// - `R` read: the link answers group reads
/// - `W` write: the link accepts group writes
/// - `U` update: the link accepts group responses
/// - `T` transmit: local changes go out on the bus
/// - `I` init: the link queries the group when it is bound
/// - `S` stateless: transmit without edge detection
///
/// `C` gates everything outbound and the read path, but deliberately not
/// inbound write/response acceptance.
use std::fmt;
use std::str::FromStr;

use crate::LaresError;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags {
    communicate: bool,
    read: bool,
    write: bool,
    update: bool,
    transmit: bool,
    init: bool,
    stateless: bool,
}

impl Flags {
    pub fn communicate(&self) -> bool {
        self.communicate
    }

    pub fn read(&self) -> bool {
        self.read
    }

    pub fn write(&self) -> bool {
        self.write
    }

    pub fn update(&self) -> bool {
        self.update
    }

    pub fn transmit(&self) -> bool {
        self.transmit
    }

    pub fn init(&self) -> bool {
        self.init
    }

    pub fn stateless(&self) -> bool {
        self.stateless
    }
}

/// The customary default: communicate, write, transmit, update.
impl Default for Flags {
    fn default() -> Self {
        Self {
            communicate: true,
            read: false,
            write: true,
            update: true,
            transmit: true,
            init: false,
            stateless: false,
        }
    }
}

impl FromStr for Flags {
    type Err = LaresError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self {
            communicate: false,
            read: false,
            write: false,
            update: false,
            transmit: false,
            init: false,
            stateless: false,
        };
        for token in s.chars() {
            let slot = match token {
                'C' => &mut flags.communicate,
                'R' => &mut flags.read,
                'W' => &mut flags.write,
                'U' => &mut flags.update,
                'T' => &mut flags.transmit,
                'I' => &mut flags.init,
                'S' => &mut flags.stateless,
                _ => return Err(LaresError::UnknownFlag { token }),
            };
            if *slot {
                return Err(LaresError::DuplicateFlag { token });
            }
            *slot = true;
        }
        Ok(flags)
    }
}

impl fmt::Display for Flags {
    /// Canonical token order, independent of the order parsed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, token) in [
            (self.communicate, 'C'),
            (self.read, 'R'),
            (self.write, 'W'),
            (self.update, 'U'),
            (self.transmit, 'T'),
            (self.init, 'I'),
            (self.stateless, 'S'),
        ] {
            if set {
                write!(f, "{token}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({self})")
    }
}

impl serde::Serialize for Flags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Flags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
