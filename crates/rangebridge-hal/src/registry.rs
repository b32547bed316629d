//! [`DriverRegistry`] – named driver factories.
//!
//! A wrapper configured with `subdevice = "<name>"` opens its device through
//! the registry: the registry looks the name up, hands the factory the
//! driver parameter table, and returns the resulting [`DeviceHandle`].
//!
//! # Built-in drivers
//!
//! | Name | Driver |
//! |---|---|
//! | `sim_rangefinder` | [`SimRangefinder`][crate::sim::SimRangefinder] |

use std::collections::HashMap;
use std::sync::Arc;

use rangebridge_types::BridgeError;
use tracing::{debug, error};

use crate::device::DeviceHandle;
use crate::sim::{SIM_DRIVER_NAME, SimRangefinder};

/// Builds an opened device from its parameter table.
pub type DriverFactory =
    Box<dyn Fn(&toml::Table) -> Result<DeviceHandle, BridgeError> + Send + Sync>;

/// Registry mapping driver names to their factories.
///
/// Construct with [`DriverRegistry::new`] (empty) or
/// [`DriverRegistry::with_builtin_drivers`], register extra drivers, then call
/// [`DriverRegistry::open`].
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with every driver shipped in this
    /// crate.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(SIM_DRIVER_NAME, |params| {
            let sim = SimRangefinder::from_params(params)?;
            Ok(DeviceHandle::with_rangefinder(
                SIM_DRIVER_NAME,
                SIM_DRIVER_NAME,
                Arc::new(sim),
            ))
        });
        registry
    }

    /// Register a driver factory.  Any previously registered factory with the
    /// same `name` is replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> Result<DeviceHandle, BridgeError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Names of all registered drivers, sorted.
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Open the driver called `name` with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownDriver`] when no factory is registered
    /// under `name`, or whatever error the factory itself reports.
    pub fn open(&self, name: &str, params: &toml::Table) -> Result<DeviceHandle, BridgeError> {
        let Some(factory) = self.factories.get(name) else {
            error!(driver = name, "no such device driver");
            return Err(BridgeError::UnknownDriver(name.to_string()));
        };
        let handle = factory(params).inspect_err(|e| {
            error!(driver = name, error = %e, "failed to open device driver");
        })?;
        debug!(driver = name, key = handle.key(), "device driver opened");
        Ok(handle)
    }
}
