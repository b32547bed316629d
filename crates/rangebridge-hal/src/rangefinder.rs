//! Generic `Rangefinder2D` trait for planar laser scanners.
//!
//! Drivers implement this trait and are handed to the rest of the stack
//! through a [`DeviceHandle`][crate::device::DeviceHandle].  Consumers only
//! ever talk to the trait, so a simulated scanner and a physical one are
//! interchangeable.

use rangebridge_types::{BridgeError, DeviceStatus};

/// A planar range-scanning sensor.
///
/// Angles are expressed in degrees and distances in the driver's unit
/// (metres for every driver in this crate).  A reading the sensor could not
/// take is reported as `f64::NAN` inside [`get_raw_data`][Self::get_raw_data].
///
/// Methods take `&self` because a single driver is shared between the thread
/// that attaches it and the sampling thread; implementations use interior
/// mutability where they need state.
pub trait Rangefinder2D: Send + Sync {
    /// Valid measurement range as `(min, max)`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::HardwareFault`] if the device cannot report it.
    fn get_distance_range(&self) -> Result<(f64, f64), BridgeError>;

    /// Angular field of view as `(min_angle, max_angle)` in degrees.
    fn get_scan_limits(&self) -> Result<(f64, f64), BridgeError>;

    /// Angle in degrees between two consecutive readings.
    fn get_horizontal_resolution(&self) -> Result<f64, BridgeError>;

    /// The latest scan, one reading per angular step across the field of
    /// view.  Missing readings are `NaN`.
    fn get_raw_data(&self) -> Result<Vec<f64>, BridgeError>;

    /// Current device health.
    fn get_device_status(&self) -> Result<DeviceStatus, BridgeError>;
}
