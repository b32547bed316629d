//! `rangebridge-hal` – device abstraction for 2D rangefinders.
//!
//! # Modules
//!
//! - [`rangefinder`] – the [`Rangefinder2D`] trait every laser driver
//!   implements.
//! - [`device`] – [`DeviceHandle`] and [`DriverList`]: opaque handles to
//!   opened drivers with a typed capability lookup.
//! - [`registry`] – [`DriverRegistry`]: named driver factories used to open a
//!   configured `subdevice`.
//! - [`sim`] – [`SimRangefinder`]: a deterministic simulated scanner with
//!   fault injection, for CI and headless runs.

pub mod device;
pub mod rangefinder;
pub mod registry;
pub mod sim;

pub use device::{DeviceHandle, DriverList};
pub use rangefinder::Rangefinder2D;
pub use registry::{DriverFactory, DriverRegistry};
pub use sim::{SimRangefinder, SimRangefinderConfig};
