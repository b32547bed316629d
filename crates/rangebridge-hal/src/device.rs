//! Opaque handles to opened drivers.
//!
//! A [`DeviceHandle`] stands for one opened driver instance.  Callers ask it
//! for the interfaces it implements through typed lookups such as
//! [`DeviceHandle::view_rangefinder`] instead of downcasting.

use std::fmt;
use std::sync::Arc;

use crate::rangefinder::Rangefinder2D;

/// One opened driver, identified by a key and the name of the driver that
/// produced it.
#[derive(Clone)]
pub struct DeviceHandle {
    key: String,
    driver: String,
    rangefinder: Option<Arc<dyn Rangefinder2D>>,
}

impl DeviceHandle {
    /// Wrap a driver that implements [`Rangefinder2D`].
    pub fn with_rangefinder(
        key: impl Into<String>,
        driver: impl Into<String>,
        rangefinder: Arc<dyn Rangefinder2D>,
    ) -> Self {
        Self {
            key: key.into(),
            driver: driver.into(),
            rangefinder: Some(rangefinder),
        }
    }

    /// A driver that exposes none of the interfaces this crate knows about.
    pub fn opaque(key: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            driver: driver.into(),
            rangefinder: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// The rangefinder interface of this device, if it has one.
    pub fn view_rangefinder(&self) -> Option<Arc<dyn Rangefinder2D>> {
        self.rangefinder.clone()
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("key", &self.key)
            .field("driver", &self.driver)
            .field("rangefinder", &self.rangefinder.is_some())
            .finish()
    }
}

/// Ordered list of devices offered to a wrapper for attachment.
#[derive(Debug, Clone, Default)]
pub struct DriverList {
    devices: Vec<DeviceHandle>,
}

impl DriverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, device: DeviceHandle) {
        self.devices.push(device);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceHandle> {
        self.devices.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }
}

impl From<Vec<DeviceHandle>> for DriverList {
    fn from(devices: Vec<DeviceHandle>) -> Self {
        Self { devices }
    }
}

impl FromIterator<DeviceHandle> for DriverList {
    fn from_iter<I: IntoIterator<Item = DeviceHandle>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRangefinder;

    #[test]
    fn rangefinder_handle_exposes_interface() {
        let handle = DeviceHandle::with_rangefinder(
            "laser",
            "sim_rangefinder",
            Arc::new(SimRangefinder::default()),
        );
        assert_eq!(handle.key(), "laser");
        assert_eq!(handle.driver(), "sim_rangefinder");
        assert!(handle.view_rangefinder().is_some());
    }

    #[test]
    fn opaque_handle_has_no_rangefinder() {
        let handle = DeviceHandle::opaque("imu", "fake_imu");
        assert!(handle.view_rangefinder().is_none());
        assert!(format!("{handle:?}").contains("rangefinder: false"));
    }

    #[test]
    fn driver_list_preserves_order() {
        let list: DriverList = vec![
            DeviceHandle::opaque("a", "x"),
            DeviceHandle::opaque("b", "y"),
        ]
        .into_iter()
        .collect();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).map(DeviceHandle::key), Some("a"));
        assert_eq!(list.get(1).map(DeviceHandle::key), Some("b"));
        assert!(list.get(2).is_none());
        assert!(DriverList::new().is_empty());
    }
}
