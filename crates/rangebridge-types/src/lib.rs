use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Seconds/nanoseconds timestamp, laid out like `builtin_interfaces/msg/Time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    /// Convert a wall-clock instant into a message timestamp.
    ///
    /// Seconds saturate at the bounds of `i32`.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        let sec = instant
            .timestamp()
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        Self {
            sec,
            nanosec: instant.timestamp_subsec_nanos(),
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }
}

/// Message header: acquisition time plus the coordinate frame of the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// Planar laser scan, field-for-field compatible with
/// `sensor_msgs/msg/LaserScan`.
///
/// Angles are in radians, ranges in the sensor's distance unit (metres for
/// every driver shipped here).  A range of `+inf` means "no return".
///
/// JSON has no literal for non-finite numbers, so `ranges` and `intensities`
/// encode them as the strings `"inf"`, `"-inf"` and `"nan"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    pub header: Header,
    /// Bearing of the first reading.
    pub angle_min: f32,
    /// Bearing of the last reading.
    pub angle_max: f32,
    /// Angular step between consecutive readings.
    pub angle_increment: f32,
    /// Time between consecutive readings (seconds).
    pub time_increment: f32,
    /// Time between two successive scans (seconds).
    pub scan_time: f32,
    pub range_min: f32,
    pub range_max: f32,
    #[serde(with = "float_seq")]
    pub ranges: Vec<f32>,
    /// One entry per range.
    #[serde(with = "float_seq")]
    pub intensities: Vec<f32>,
}

// Float sequences that keep non-finite values through self-describing
// formats.
mod float_seq {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Float {
        Finite(f32),
        Special(String),
    }

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| {
            if v.is_finite() {
                Float::Finite(v)
            } else if v.is_nan() {
                Float::Special("nan".to_string())
            } else if v > 0.0 {
                Float::Special("inf".to_string())
            } else {
                Float::Special("-inf".to_string())
            }
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        Vec::<Float>::deserialize(deserializer)?
            .into_iter()
            .map(|f| match f {
                Float::Finite(v) => Ok(v),
                Float::Special(s) => match s.as_str() {
                    "inf" => Ok(f32::INFINITY),
                    "-inf" => Ok(f32::NEG_INFINITY),
                    "nan" => Ok(f32::NAN),
                    other => Err(D::Error::custom(format!("invalid float {other:?}"))),
                },
            })
            .collect()
    }
}

/// Health code reported by a rangefinder alongside every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Device is powered and idle.
    OkStandby,
    /// Device is powered and actively scanning.
    OkInUse,
    /// Unspecified hardware error.
    GeneralError,
    /// Device stopped answering.
    Timeout,
}

impl DeviceStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, DeviceStatus::OkStandby | DeviceStatus::OkInUse)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::OkStandby => write!(f, "ok_standby"),
            DeviceStatus::OkInUse => write!(f, "ok_in_use"),
            DeviceStatus::GeneralError => write!(f, "general_error"),
            DeviceStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Static properties of a rangefinder, queried once when it is attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCapabilities {
    pub min_distance: f64,
    pub max_distance: f64,
    /// Degrees.
    pub min_angle: f64,
    /// Degrees.
    pub max_angle: f64,
    /// Degrees between consecutive samples.
    pub angular_resolution: f64,
}

/// The three startup queries an attached rangefinder must answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityQuery {
    DistanceRange,
    ScanLimits,
    HorizontalResolution,
}

impl fmt::Display for CapabilityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityQuery::DistanceRange => write!(f, "min & max distance range"),
            CapabilityQuery::ScanLimits => write!(f, "min & max angle scan range"),
            CapabilityQuery::HorizontalResolution => write!(f, "horizontal resolution"),
        }
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "rangebridge-nws::laser_topic"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    LaserScan(LaserScan),
    /// Emitted when a device reports a different health code than before.
    DeviceStatus { device: String, status: DeviceStatus },
}

/// Global error type spanning device attachment, sensor reads, configuration
/// and transport failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Expected exactly one device to attach, got {0}")]
    TooManyDevices(usize),

    #[error("Device '{0}' does not provide the rangefinder interface")]
    InvalidDevice(String),

    #[error("Laser device does not provide {query}: {details}")]
    CapabilityQuery {
        query: CapabilityQuery,
        details: String,
    },

    #[error("Sensor returned error: {0}")]
    SensorRead(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Unknown device driver '{0}'")]
    UnknownDriver(String),

    #[error("No device attached")]
    NotAttached,

    #[error("Invalid lifecycle transition: {0}")]
    InvalidState(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
