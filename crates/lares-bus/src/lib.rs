//! Lares bus layer.
//!
//! Addressing, priority classes, and frame types for a shared group bus,
//! plus an in-process loopback bus (`LocalBus`) for devices living in the
//! same process.
//!
//! # Quick start
//!
//! ```rust
//! use lares_bus::{GroupAddress, LocalBus, Priority};
//!
//! # fn example() -> Result<(), lares_bus::BusError> {
//! let bus = LocalBus::new();
//! let sensor = bus.attach("1.1.1".parse()?)?;
//! let mut display = bus.attach("1.1.2".parse()?)?;
//!
//! let temperature: GroupAddress = "6/0/1".parse()?;
//! sensor.write(temperature, Priority::Low, vec![0x0C, 0x1A])?;
//!
//! let frame = display.try_recv().expect("frame waiting");
//! assert_eq!(frame.group, temperature);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod address;
mod error;
mod frame;
mod local;
mod priority;

pub use address::{GroupAddress, IndividualAddress};
pub use error::BusError;
pub use frame::{FrameService, GroupFrame};
pub use local::{BusTap, LocalBus};
pub use priority::Priority;
