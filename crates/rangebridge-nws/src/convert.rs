//! Translation of one raw rangefinder reading into a [`LaserScan`].

use std::f64::consts::PI;

use rangebridge_types::{Header, LaserScan, SensorCapabilities, Time};

/// Degrees to radians, narrowed to the message's `f32` fields.
pub fn deg_to_rad(degrees: f64) -> f32 {
    (degrees * (PI / 180.0)) as f32
}

/// Convert raw readings into `(ranges, intensities)`.
///
/// A missing reading (`NaN`) becomes `+inf`: the message format reserves
/// `NaN` for unused fields.  Intensity is not sensed, so every entry is
/// `0.0`.
pub fn convert_ranges(raw: &[f64]) -> (Vec<f32>, Vec<f32>) {
    let ranges = raw
        .iter()
        .map(|&r| if r.is_nan() { f32::INFINITY } else { r as f32 })
        .collect();
    (ranges, vec![0.0; raw.len()])
}

/// Assemble the outbound scan for one tick.
///
/// All readings of a scan are treated as simultaneous, so `time_increment`
/// is zero; `scan_time` is the sampling period.
pub fn build_laser_scan(
    raw: &[f64],
    capabilities: &SensorCapabilities,
    frame_id: &str,
    scan_time: f64,
    stamp: Time,
) -> LaserScan {
    let (ranges, intensities) = convert_ranges(raw);
    LaserScan {
        header: Header {
            stamp,
            frame_id: frame_id.to_string(),
        },
        angle_min: deg_to_rad(capabilities.min_angle),
        angle_max: deg_to_rad(capabilities.max_angle),
        angle_increment: deg_to_rad(capabilities.angular_resolution),
        time_increment: 0.0,
        scan_time: scan_time as f32,
        range_min: capabilities.min_distance as f32,
        range_max: capabilities.max_distance as f32,
        ranges,
        intensities,
    }
}
