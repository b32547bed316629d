//! Wrapper configuration.

use std::time::Duration;

use rangebridge_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Options of a [`RangefinderNws`][crate::RangefinderNws].
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwsConfig {
    /// Driver to open and own at `open` time. When absent the wrapper waits
    /// for an external `attach_all`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdevice: Option<String>,

    /// Topic the scans are published on.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Frame id written into every scan header.
    #[serde(default = "default_frame")]
    pub frame: String,

    /// Sampling period in seconds.
    #[serde(default = "default_period")]
    pub period: f64,

    /// Parameters forwarded verbatim to the `subdevice` driver.
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub device: toml::Table,
}

fn default_topic() -> String {
    "laser_topic".to_string()
}
fn default_frame() -> String {
    "laser_frame".to_string()
}
fn default_period() -> f64 {
    0.010
}

impl Default for NwsConfig {
    fn default() -> Self {
        Self {
            subdevice: None,
            topic: default_topic(),
            frame: default_frame(),
            period: default_period(),
            device: toml::Table::new(),
        }
    }
}

impl NwsConfig {
    /// Reject values the sampling loop cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.topic.trim().is_empty() {
            return Err(BridgeError::Config("topic must not be empty".to_string()));
        }
        self.period_duration().map(|_| ())
    }

    /// The sampling period as a [`Duration`].
    pub fn period_duration(&self) -> Result<Duration, BridgeError> {
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(BridgeError::Config(format!(
                "period must be a positive number of seconds, got {}",
                self.period
            )));
        }
        Duration::try_from_secs_f64(self.period)
            .map_err(|e| BridgeError::Config(format!("period {} is out of range: {e}", self.period)))
    }

    /// Topic carrying device-status change notifications.
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.topic)
    }
}
