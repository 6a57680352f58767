/// Bus addressing.
///
/// Two address spaces share the bus: group addresses name a communication
/// group (`main/middle/sub`, three-level form), individual addresses name a
/// physical device (`area.line.device`). Both pack into 16 bits.
use std::fmt;
use std::str::FromStr;

use crate::BusError;

// ── GroupAddress ─────────────────────────────────────────────────────────

/// Three-level group address, e.g. `6/0/1`.
///
/// Packed as 5 bits main, 3 bits middle, 8 bits sub. Every 16-bit value is
/// a valid packed address, so `raw`/`from_raw` are total.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupAddress(u16);

impl GroupAddress {
    /// Build from the three levels. Range-checked: main 0-31, middle 0-7,
    /// sub 0-255.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self, BusError> {
        if main > 0x1F {
            return Err(invalid_group(
                format!("{main}/{middle}/{sub}"),
                "main out of range (0-31)",
            ));
        }
        if middle > 0x7 {
            return Err(invalid_group(
                format!("{main}/{middle}/{sub}"),
                "middle out of range (0-7)",
            ));
        }
        Ok(Self((main as u16) << 11 | (middle as u16) << 8 | sub as u16))
    }

    /// Rebuild from a packed 16-bit value.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// The packed 16-bit value.
    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn main(&self) -> u8 {
        (self.0 >> 11) as u8
    }

    pub fn middle(&self) -> u8 {
        ((self.0 >> 8) & 0x7) as u8
    }

    pub fn sub(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl fmt::Debug for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupAddress({self})")
    }
}

impl FromStr for GroupAddress {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [main, middle, sub] = parts[..] else {
            return Err(invalid_group(s, "expected main/middle/sub"));
        };
        let main = parse_level(main).ok_or_else(|| invalid_group(s, "main is not a number"))?;
        let middle =
            parse_level(middle).ok_or_else(|| invalid_group(s, "middle is not a number"))?;
        let sub = parse_level(sub).ok_or_else(|| invalid_group(s, "sub is not a number"))?;
        if sub > 0xFF {
            return Err(invalid_group(s, "sub out of range (0-255)"));
        }
        if main > 0x1F {
            return Err(invalid_group(s, "main out of range (0-31)"));
        }
        if middle > 0x7 {
            return Err(invalid_group(s, "middle out of range (0-7)"));
        }
        GroupAddress::new(main as u8, middle as u8, sub as u8)
    }
}

impl serde::Serialize for GroupAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for GroupAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── IndividualAddress ────────────────────────────────────────────────────

/// Physical device address, e.g. `1.2.3`.
///
/// Packed as 4 bits area, 4 bits line, 8 bits device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndividualAddress(u16);

impl IndividualAddress {
    /// Build from the three parts. Range-checked: area 0-15, line 0-15,
    /// device 0-255.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self, BusError> {
        if area > 0xF {
            return Err(invalid_individual(
                format!("{area}.{line}.{device}"),
                "area out of range (0-15)",
            ));
        }
        if line > 0xF {
            return Err(invalid_individual(
                format!("{area}.{line}.{device}"),
                "line out of range (0-15)",
            ));
        }
        Ok(Self((area as u16) << 12 | (line as u16) << 8 | device as u16))
    }

    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn area(&self) -> u8 {
        (self.0 >> 12) as u8
    }

    pub fn line(&self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    pub fn device(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl fmt::Debug for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndividualAddress({self})")
    }
}

impl FromStr for IndividualAddress {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let [area, line, device] = parts[..] else {
            return Err(invalid_individual(s, "expected area.line.device"));
        };
        let area = parse_level(area).ok_or_else(|| invalid_individual(s, "area is not a number"))?;
        let line = parse_level(line).ok_or_else(|| invalid_individual(s, "line is not a number"))?;
        let device =
            parse_level(device).ok_or_else(|| invalid_individual(s, "device is not a number"))?;
        if area > 0xF {
            return Err(invalid_individual(s, "area out of range (0-15)"));
        }
        if line > 0xF {
            return Err(invalid_individual(s, "line out of range (0-15)"));
        }
        if device > 0xFF {
            return Err(invalid_individual(s, "device out of range (0-255)"));
        }
        IndividualAddress::new(area as u8, line as u8, device as u8)
    }
}

impl serde::Serialize for IndividualAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for IndividualAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn parse_level(part: &str) -> Option<u32> {
    // Leading '+' and whitespace are not address syntax.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn invalid_group(input: impl Into<String>, reason: &str) -> BusError {
    BusError::InvalidGroupAddress {
        input: input.into(),
        reason: reason.to_string(),
    }
}

fn invalid_individual(input: impl Into<String>, reason: &str) -> BusError {
    BusError::InvalidIndividualAddress {
        input: input.into(),
        reason: reason.to_string(),
    }
}
