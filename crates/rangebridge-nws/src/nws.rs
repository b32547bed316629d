//! [`RangefinderNws`] – network wrapper server for a 2D rangefinder.
//!
//! The wrapper binds exactly one [`Rangefinder2D`], caches its static
//! capabilities, and on every tick of a dedicated sampling thread turns the
//! latest reading into a [`LaserScan`] published through a [`Transport`].
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured ──attach_all──▶ Configured ──start──▶ Running
//!      ▲                          │  ▲                  │
//!      └────────detach_all────────┘  └───────stop───────┘
//!
//! any state ──close──▶ Closed
//! ```
//!
//! # Per-tick failures
//!
//! A tick reads the range data and the device status, always both.  If
//! either read fails the tick logs the failure and publishes nothing; the
//! sampling thread keeps running.  The device status never gates
//! publication; changes are logged and announced on `<topic>/status`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rangebridge_hal::{DeviceHandle, DriverList, DriverRegistry, Rangefinder2D};
use rangebridge_middleware::Transport;
use rangebridge_types::{
    BridgeError, CapabilityQuery, DeviceStatus, EventPayload, SensorCapabilities,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::NwsConfig;
use crate::convert::build_laser_scan;
use crate::periodic::PeriodicTask;

/// Externally visible lifecycle state of a [`RangefinderNws`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NwsState {
    /// No device attached.
    Unconfigured,
    /// A device is attached and its capabilities are cached; not sampling.
    Configured,
    /// The sampling thread is running.
    Running,
    /// Terminal.
    Closed,
}

/// Snapshot of the wrapper's diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NwsStats {
    /// Ticks that found a device attached.
    pub ticks: u64,
    /// Scans handed to the transport.
    pub published: u64,
    /// Ticks skipped because a sensor read failed.
    pub read_failures: u64,
    /// Most recent successfully read device status.
    pub last_status: Option<DeviceStatus>,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    published: AtomicU64,
    read_failures: AtomicU64,
    last_status: Mutex<Option<DeviceStatus>>,
}

impl Counters {
    fn snapshot(&self) -> NwsStats {
        NwsStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            last_status: *self.last_status.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

// Everything a tick needs, frozen at attach time and shared with the
// sampling thread.  `tick_lock` keeps manual ticks from overlapping the
// loop's.
struct Sampler {
    device_key: String,
    device: Arc<dyn Rangefinder2D>,
    capabilities: SensorCapabilities,
    transport: Arc<dyn Transport>,
    topic: String,
    status_topic: String,
    frame: String,
    period: f64,
    counters: Arc<Counters>,
    tick_lock: Mutex<()>,
}

impl Sampler {
    fn tick(&self) {
        let _serial = self.tick_lock.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(topic = %self.topic, "tick");
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let ranges = self.device.get_raw_data();
        let status = self.device.get_device_status();
        let (ranges, status) = match (ranges, status) {
            (Ok(ranges), Ok(status)) => (ranges, status),
            (ranges, status) => {
                let details = [ranges.err(), status.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                let err = BridgeError::SensorRead(details);
                self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                error!(device = %self.device_key, error = %err, "skipping scan");
                return;
            }
        };

        self.observe_status(status);

        let scan = build_laser_scan(
            &ranges,
            &self.capabilities,
            &self.frame,
            self.period,
            self.transport.now(),
        );
        match self.transport.publish(&self.topic, EventPayload::LaserScan(scan)) {
            Ok(delivered) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                trace!(topic = %self.topic, readings = ranges.len(), delivered, "scan published");
            }
            Err(e) => debug!(topic = %self.topic, error = %e, "scan publish failed"),
        }
    }

    fn observe_status(&self, status: DeviceStatus) {
        let previous = self
            .counters
            .last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(status);
        if previous == Some(status) {
            return;
        }

        if status.is_ok() {
            info!(device = %self.device_key, %status, "device status changed");
        } else {
            warn!(device = %self.device_key, %status, "device reports a fault");
        }
        let payload = EventPayload::DeviceStatus {
            device: self.device_key.clone(),
            status,
        };
        if let Err(e) = self.transport.publish(&self.status_topic, payload) {
            debug!(topic = %self.status_topic, error = %e, "status publish failed");
        }
    }
}

/// Publishes the readings of one attached [`Rangefinder2D`] as laser scans.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use rangebridge_hal::DriverRegistry;
/// use rangebridge_middleware::{EventBus, Node};
/// use rangebridge_nws::{NwsConfig, NwsState, RangefinderNws};
///
/// let bus = Arc::new(EventBus::default());
/// let node = Arc::new(Node::new("rangebridge_node", Arc::clone(&bus)));
///
/// let mut nws = RangefinderNws::new(node);
/// let config = NwsConfig {
///     subdevice: Some("sim_rangefinder".to_string()),
///     ..NwsConfig::default()
/// };
/// nws.open(config, &DriverRegistry::with_builtin_drivers()).unwrap();
/// assert_eq!(nws.state(), NwsState::Running);
/// nws.close();
/// ```
pub struct RangefinderNws {
    transport: Arc<dyn Transport>,
    config: NwsConfig,
    sampler: Option<Arc<Sampler>>,
    task: Option<PeriodicTask>,
    owned_device: Option<DeviceHandle>,
    counters: Arc<Counters>,
    closed: bool,
}

impl RangefinderNws {
    /// Create an unconfigured wrapper publishing through `transport`, with
    /// the default [`NwsConfig`].
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: NwsConfig::default(),
            sampler: None,
            task: None,
            owned_device: None,
            counters: Arc::new(Counters::default()),
            closed: false,
        }
    }

    pub fn state(&self) -> NwsState {
        if self.closed {
            NwsState::Closed
        } else if self.is_running() {
            NwsState::Running
        } else if self.sampler.is_some() {
            NwsState::Configured
        } else {
            NwsState::Unconfigured
        }
    }

    pub fn config(&self) -> &NwsConfig {
        &self.config
    }

    /// Capabilities of the attached device, if any.
    pub fn capabilities(&self) -> Option<SensorCapabilities> {
        self.sampler.as_ref().map(|s| s.capabilities)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(PeriodicTask::is_running)
    }

    /// `true` when the attached device was opened by [`open`][Self::open].
    pub fn owns_device(&self) -> bool {
        self.owned_device.is_some()
    }

    pub fn stats(&self) -> NwsStats {
        self.counters.snapshot()
    }

    /// Replace the configuration.  Only allowed before a device is attached.
    pub fn configure(&mut self, config: NwsConfig) -> Result<(), BridgeError> {
        self.ensure_open("configure")?;
        if self.sampler.is_some() {
            return Err(BridgeError::InvalidState(
                "cannot reconfigure while a device is attached".to_string(),
            ));
        }
        config.validate()?;
        info!(topic = %config.topic, frame = %config.frame, period_s = config.period, "configured");
        self.config = config;
        Ok(())
    }

    /// Apply `config`, then open, attach and start its `subdevice` when one
    /// is named.  Without a subdevice the wrapper stays unconfigured until
    /// [`attach_all`][Self::attach_all] is called.
    ///
    /// # Errors
    ///
    /// Fails when the config is invalid, the subdevice cannot be opened
    /// through `registry`, or attaching it fails.
    pub fn open(&mut self, config: NwsConfig, registry: &DriverRegistry) -> Result<(), BridgeError> {
        self.configure(config)?;
        let Some(name) = self.config.subdevice.clone() else {
            info!("no subdevice configured; waiting for attach");
            return Ok(());
        };

        let handle = registry.open(&name, &self.config.device).inspect_err(|e| {
            error!(subdevice = %name, error = %e, "failed to open subdevice, check params");
        })?;
        self.attach_all(&DriverList::from(vec![handle.clone()]))?;
        self.owned_device = Some(handle);
        self.start()
    }

    /// Bind the single rangefinder in `devices` and cache its capabilities.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::TooManyDevices`] unless `devices` holds exactly one
    ///   handle.
    /// * [`BridgeError::InvalidDevice`] when that handle is not a rangefinder.
    /// * [`BridgeError::CapabilityQuery`] naming the first capability query
    ///   that failed.  Nothing is bound in that case.
    /// * [`BridgeError::InvalidState`] while running or after close.
    pub fn attach_all(&mut self, devices: &DriverList) -> Result<(), BridgeError> {
        self.ensure_open("attach")?;
        if self.is_running() {
            return Err(BridgeError::InvalidState(
                "cannot attach while sampling is running".to_string(),
            ));
        }
        let handle = match (devices.len(), devices.get(0)) {
            (1, Some(handle)) => handle,
            (count, _) => {
                let keys: Vec<&str> = devices.iter().map(DeviceHandle::key).collect();
                error!(count, ?keys, "expected exactly one device to attach");
                return Err(BridgeError::TooManyDevices(count));
            }
        };
        let Some(device) = handle.view_rangefinder() else {
            error!(
                device = handle.key(),
                driver = handle.driver(),
                "device passed to attach is not a rangefinder"
            );
            return Err(BridgeError::InvalidDevice(handle.key().to_string()));
        };

        let capabilities = query_capabilities(device.as_ref())?;
        *self.counters.last_status.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.sampler = Some(Arc::new(Sampler {
            device_key: handle.key().to_string(),
            device,
            capabilities,
            transport: Arc::clone(&self.transport),
            topic: self.config.topic.clone(),
            status_topic: self.config.status_topic(),
            frame: self.config.frame.clone(),
            period: self.config.period,
            counters: Arc::clone(&self.counters),
            tick_lock: Mutex::new(()),
        }));
        if self.owned_device.take().is_some() {
            debug!("released previously owned subdevice");
        }
        info!(
            device = handle.key(),
            driver = handle.driver(),
            min_distance = capabilities.min_distance,
            max_distance = capabilities.max_distance,
            min_angle = capabilities.min_angle,
            max_angle = capabilities.max_angle,
            resolution = capabilities.angular_resolution,
            "device attached"
        );
        Ok(())
    }

    /// Stop sampling and unbind the device.  Idempotent.
    pub fn detach_all(&mut self) {
        self.stop();
        if let Some(sampler) = self.sampler.take() {
            info!(device = %sampler.device_key, "device detached");
        }
    }

    /// Start the sampling thread.  A no-op when already running.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotAttached`] without a device,
    /// [`BridgeError::InvalidState`] after close.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        self.ensure_open("start")?;
        if self.is_running() {
            debug!("sampling already running");
            return Ok(());
        }
        let Some(sampler) = self.sampler.as_ref().map(Arc::clone) else {
            return Err(BridgeError::NotAttached);
        };
        let period = self.config.period_duration()?;
        let thread_name = format!("nws:{}", self.config.topic);
        let task = PeriodicTask::spawn(&thread_name, period, move || sampler.tick())?;
        info!(
            topic = %self.config.topic,
            period_s = task.period().as_secs_f64(),
            "sampling started"
        );
        self.task = Some(task);
        Ok(())
    }

    /// Stop the sampling thread, waiting for an in-flight tick.  Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
            info!(topic = %self.config.topic, "sampling stopped");
        }
    }

    /// Run one sample-translate-publish cycle on the caller's thread.
    /// A no-op when no device is attached.
    pub fn tick(&self) {
        match &self.sampler {
            Some(sampler) => sampler.tick(),
            None => trace!("tick without attached device"),
        }
    }

    /// Stop, detach, and release an owned subdevice.  Idempotent; the
    /// wrapper cannot be reused afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.detach_all();
        self.owned_device = None;
        self.closed = true;
        info!(topic = %self.config.topic, "closed");
    }

    fn ensure_open(&self, operation: &str) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::InvalidState(format!("cannot {operation} after close")));
        }
        Ok(())
    }
}

impl Drop for RangefinderNws {
    fn drop(&mut self) {
        self.close();
    }
}

fn query_capabilities(device: &dyn Rangefinder2D) -> Result<SensorCapabilities, BridgeError> {
    let (min_distance, max_distance) = device
        .get_distance_range()
        .map_err(|e| capability_error(CapabilityQuery::DistanceRange, e))?;
    let (min_angle, max_angle) = device
        .get_scan_limits()
        .map_err(|e| capability_error(CapabilityQuery::ScanLimits, e))?;
    let angular_resolution = device
        .get_horizontal_resolution()
        .map_err(|e| capability_error(CapabilityQuery::HorizontalResolution, e))?;
    Ok(SensorCapabilities {
        min_distance,
        max_distance,
        min_angle,
        max_angle,
        angular_resolution,
    })
}

fn capability_error(query: CapabilityQuery, source: BridgeError) -> BridgeError {
    let err = BridgeError::CapabilityQuery {
        query,
        details: source.to_string(),
    };
    error!(error = %err, "capability query failed");
    err
}
