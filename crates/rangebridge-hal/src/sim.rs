//! In-process simulated rangefinder for CI and headless runs.
//!
//! [`SimRangefinder`] models a scanner standing in front of a flat wall.
//! Every reading is deterministic, so tests can assert on exact values.  The
//! simulation also exposes fault injection hooks so callers can exercise
//! capability-query failures, read failures, and status changes without
//! real hardware.
//!
//! # Example
//!
//! ```rust
//! use rangebridge_hal::{Rangefinder2D, SimRangefinder, SimRangefinderConfig};
//!
//! let laser = SimRangefinder::new(SimRangefinderConfig::default()).unwrap();
//! let scan = laser.get_raw_data().unwrap();
//! assert_eq!(scan.len(), 181);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use rangebridge_types::{BridgeError, CapabilityQuery, DeviceStatus};
use serde::Deserialize;

/// Driver name under which [`SimRangefinder`] is registered.
pub const SIM_DRIVER_NAME: &str = "sim_rangefinder";

/// Largest sweep the simulator will produce.
pub const MAX_SAMPLES_PER_SWEEP: usize = 100_000;

/// Geometry and behaviour of the simulated scanner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimRangefinderConfig {
    pub min_distance: f64,
    pub max_distance: f64,
    /// Degrees.
    pub min_angle: f64,
    /// Degrees.
    pub max_angle: f64,
    /// Degrees between readings.
    pub resolution: f64,
    /// Perpendicular distance from the scanner to the simulated wall.
    pub wall_distance: f64,
    /// Report every n-th reading as missing. `0` disables dropouts.
    pub dropout_every: usize,
}

impl Default for SimRangefinderConfig {
    fn default() -> Self {
        Self {
            min_distance: 0.1,
            max_distance: 10.0,
            min_angle: -90.0,
            max_angle: 90.0,
            resolution: 1.0,
            wall_distance: 2.0,
            dropout_every: 0,
        }
    }
}

impl SimRangefinderConfig {
    fn validate(&self) -> Result<(), BridgeError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(BridgeError::Config(format!(
                "sim resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.min_angle < self.max_angle) {
            return Err(BridgeError::Config(format!(
                "sim angle limits are inverted: [{}, {}]",
                self.min_angle, self.max_angle
            )));
        }
        if !(self.min_distance >= 0.0 && self.min_distance < self.max_distance) {
            return Err(BridgeError::Config(format!(
                "sim distance limits are invalid: [{}, {}]",
                self.min_distance, self.max_distance
            )));
        }
        let samples = self.sample_count();
        if samples > MAX_SAMPLES_PER_SWEEP {
            return Err(BridgeError::Config(format!(
                "sim sweep of {samples} readings exceeds {MAX_SAMPLES_PER_SWEEP}; raise resolution or narrow the scan limits"
            )));
        }
        Ok(())
    }

    /// Number of readings in one sweep, both field-of-view limits included.
    /// Saturates instead of overflowing for degenerate geometry.
    pub fn sample_count(&self) -> usize {
        let steps = ((self.max_angle - self.min_angle) / self.resolution).floor();
        if steps.is_nan() || steps < 0.0 {
            return 0;
        }
        // `as` saturates at usize::MAX for huge or infinite values.
        (steps as usize).saturating_add(1)
    }
}

#[derive(Debug)]
struct SimState {
    status: DeviceStatus,
    fail_raw_data: bool,
    fail_status: bool,
    failing_query: Option<CapabilityQuery>,
    scripted_ranges: Option<Vec<f64>>,
    reads: u64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            status: DeviceStatus::OkInUse,
            fail_raw_data: false,
            fail_status: false,
            failing_query: None,
            scripted_ranges: None,
            reads: 0,
        }
    }
}

/// A simulated planar scanner looking at a flat wall.
#[derive(Debug)]
pub struct SimRangefinder {
    config: SimRangefinderConfig,
    state: Mutex<SimState>,
}

impl SimRangefinder {
    /// Create a simulator, rejecting inconsistent geometry.
    pub fn new(config: SimRangefinderConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(SimState::default()),
        })
    }

    /// Build a simulator from a driver parameter table.  Unknown keys are
    /// ignored so the same table can carry options for other drivers.
    pub fn from_params(params: &toml::Table) -> Result<Self, BridgeError> {
        let config: SimRangefinderConfig = toml::Value::Table(params.clone())
            .try_into()
            .map_err(|e| BridgeError::Config(format!("invalid sim_rangefinder params: {e}")))?;
        Self::new(config)
    }

    pub fn config(&self) -> &SimRangefinderConfig {
        &self.config
    }

    /// Health code returned by subsequent status reads.
    pub fn set_status(&self, status: DeviceStatus) {
        self.state().status = status;
    }

    /// Make `get_raw_data` fail until cleared.
    pub fn set_raw_data_failure(&self, fail: bool) {
        self.state().fail_raw_data = fail;
    }

    /// Make `get_device_status` fail until cleared.
    pub fn set_status_failure(&self, fail: bool) {
        self.state().fail_status = fail;
    }

    /// Make one capability query fail. `None` restores all of them.
    pub fn fail_capability_query(&self, query: Option<CapabilityQuery>) {
        self.state().failing_query = query;
    }

    /// Return exactly `ranges` from every subsequent read instead of the wall
    /// model. `None` restores the wall model.
    pub fn script_ranges(&self, ranges: Option<Vec<f64>>) {
        self.state().scripted_ranges = ranges;
    }

    /// Number of successful `get_raw_data` calls so far.
    pub fn read_count(&self) -> u64 {
        self.state().reads
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_query(&self, query: CapabilityQuery) -> Result<(), BridgeError> {
        if self.state().failing_query == Some(query) {
            return Err(BridgeError::HardwareFault {
                component: SIM_DRIVER_NAME.to_string(),
                details: format!("{query} unavailable"),
            });
        }
        Ok(())
    }

    // Distance to a wall perpendicular to the 0° bearing, NaN when the ray
    // never hits it or the hit is outside the measurable band.
    fn wall_reading(&self, angle_deg: f64) -> f64 {
        let cos = angle_deg.to_radians().cos();
        if cos <= f64::EPSILON {
            return f64::NAN;
        }
        let range = self.config.wall_distance / cos;
        if range < self.config.min_distance || range > self.config.max_distance {
            f64::NAN
        } else {
            range
        }
    }
}

impl Default for SimRangefinder {
    fn default() -> Self {
        Self {
            config: SimRangefinderConfig::default(),
            state: Mutex::new(SimState::default()),
        }
    }
}

impl crate::rangefinder::Rangefinder2D for SimRangefinder {
    fn get_distance_range(&self) -> Result<(f64, f64), BridgeError> {
        self.check_query(CapabilityQuery::DistanceRange)?;
        Ok((self.config.min_distance, self.config.max_distance))
    }

    fn get_scan_limits(&self) -> Result<(f64, f64), BridgeError> {
        self.check_query(CapabilityQuery::ScanLimits)?;
        Ok((self.config.min_angle, self.config.max_angle))
    }

    fn get_horizontal_resolution(&self) -> Result<f64, BridgeError> {
        self.check_query(CapabilityQuery::HorizontalResolution)?;
        Ok(self.config.resolution)
    }

    fn get_raw_data(&self) -> Result<Vec<f64>, BridgeError> {
        let mut state = self.state();
        if state.fail_raw_data {
            return Err(BridgeError::HardwareFault {
                component: SIM_DRIVER_NAME.to_string(),
                details: "scan buffer unavailable".to_string(),
            });
        }
        state.reads += 1;
        if let Some(ranges) = &state.scripted_ranges {
            return Ok(ranges.clone());
        }
        drop(state);

        let dropout = self.config.dropout_every;
        let ranges = (0..self.config.sample_count())
            .map(|i| {
                if dropout > 0 && (i + 1) % dropout == 0 {
                    return f64::NAN;
                }
                self.wall_reading(self.config.min_angle + i as f64 * self.config.resolution)
            })
            .collect();
        Ok(ranges)
    }

    fn get_device_status(&self) -> Result<DeviceStatus, BridgeError> {
        let state = self.state();
        if state.fail_status {
            return Err(BridgeError::HardwareFault {
                component: SIM_DRIVER_NAME.to_string(),
                details: "status register unreadable".to_string(),
            });
        }
        Ok(state.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rangefinder::Rangefinder2D;

    #[test]
    fn default_geometry_reports_capabilities() {
        let sim = SimRangefinder::default();
        assert_eq!(sim.get_distance_range().unwrap(), (0.1, 10.0));
        assert_eq!(sim.get_scan_limits().unwrap(), (-90.0, 90.0));
        assert_eq!(sim.get_horizontal_resolution().unwrap(), 1.0);
    }

    #[test]
    fn wall_model_is_symmetric_and_nan_at_edges() {
        let sim = SimRangefinder::default();
        let ranges = sim.get_raw_data().unwrap();
        assert_eq!(ranges.len(), 181);
        // Straight ahead hits the wall at exactly its distance.
        assert!((ranges[90] - 2.0).abs() < 1e-9);
        assert!((ranges[60] - ranges[120]).abs() < 1e-9);
        // ±90° rays run parallel to the wall.
        assert!(ranges[0].is_nan());
        assert!(ranges[180].is_nan());
        // 80° off-axis is 2 / cos(80°) ≈ 11.5 m, beyond max_distance.
        assert!(ranges[10].is_nan());
    }

    #[test]
    fn dropouts_produce_nan_samples() {
        let sim = SimRangefinder::new(SimRangefinderConfig {
            dropout_every: 3,
            ..SimRangefinderConfig::default()
        })
        .unwrap();
        let ranges = sim.get_raw_data().unwrap();
        assert!(ranges[89].is_nan());
        assert!(!ranges[90].is_nan());
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let err = SimRangefinder::new(SimRangefinderConfig {
            resolution: 0.0,
            ..SimRangefinderConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        let err = SimRangefinder::new(SimRangefinderConfig {
            min_angle: 10.0,
            max_angle: -10.0,
            ..SimRangefinderConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn oversized_sweep_is_rejected() {
        let params: toml::Table = toml::from_str("resolution = 1e-300").unwrap();
        assert!(matches!(
            SimRangefinder::from_params(&params),
            Err(BridgeError::Config(_))
        ));

        let unbounded = SimRangefinderConfig {
            min_angle: f64::NEG_INFINITY,
            ..SimRangefinderConfig::default()
        };
        assert_eq!(unbounded.sample_count(), usize::MAX);
        assert!(SimRangefinder::new(unbounded).is_err());

        let widest = SimRangefinderConfig {
            min_angle: 0.0,
            max_angle: (MAX_SAMPLES_PER_SWEEP - 1) as f64 * 0.001,
            resolution: 0.001,
            ..SimRangefinderConfig::default()
        };
        assert!(widest.sample_count() <= MAX_SAMPLES_PER_SWEEP);
        assert!(SimRangefinder::new(widest).is_ok());
    }

    #[test]
    fn from_params_reads_overrides_and_ignores_unknown_keys() {
        let params: toml::Table = toml::from_str(
            r#"
            resolution = 0.5
            wall_distance = 3.0
            unrelated = "ignored"
            "#,
        )
        .unwrap();
        let sim = SimRangefinder::from_params(&params).unwrap();
        assert_eq!(sim.config().resolution, 0.5);
        assert_eq!(sim.config().sample_count(), 361);
        assert_eq!(sim.config().max_distance, 10.0);
    }

    #[test]
    fn from_params_rejects_wrong_types() {
        let params: toml::Table = toml::from_str(r#"resolution = "fine""#).unwrap();
        assert!(matches!(
            SimRangefinder::from_params(&params),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn fault_injection_toggles() {
        let sim = SimRangefinder::default();
        sim.fail_capability_query(Some(CapabilityQuery::ScanLimits));
        assert!(sim.get_distance_range().is_ok());
        assert!(sim.get_scan_limits().is_err());
        sim.fail_capability_query(None);
        assert!(sim.get_scan_limits().is_ok());

        sim.set_raw_data_failure(true);
        assert!(sim.get_raw_data().is_err());
        sim.set_raw_data_failure(false);
        assert!(sim.get_raw_data().is_ok());
        assert_eq!(sim.read_count(), 1);

        sim.set_status(DeviceStatus::Timeout);
        assert_eq!(sim.get_device_status().unwrap(), DeviceStatus::Timeout);
        sim.set_status_failure(true);
        assert!(sim.get_device_status().is_err());
    }

    #[test]
    fn scripted_ranges_override_the_wall() {
        let sim = SimRangefinder::default();
        sim.script_ranges(Some(vec![1.0, f64::NAN, 3.0]));
        let ranges = sim.get_raw_data().unwrap();
        assert_eq!(ranges.len(), 3);
        assert!(ranges[1].is_nan());
        sim.script_ranges(None);
        assert_eq!(sim.get_raw_data().unwrap().len(), 181);
    }
}
