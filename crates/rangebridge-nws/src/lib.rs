//! `rangebridge-nws` – network wrapper server for 2D rangefinders.
//!
//! Binds one [`Rangefinder2D`][rangebridge_hal::Rangefinder2D], samples it
//! at a fixed period on a dedicated thread, and republishes every reading as
//! a [`LaserScan`][rangebridge_types::LaserScan] through a
//! [`Transport`][rangebridge_middleware::Transport].
//!
//! # Modules
//!
//! - [`config`] – [`NwsConfig`]: topic, frame, period and optional subdevice.
//! - [`convert`] – raw reading to `LaserScan` translation.
//! - [`periodic`] – [`PeriodicTask`]: fixed-rate job on its own thread.
//! - [`nws`] – [`RangefinderNws`]: attach, sampling loop and lifecycle.

pub mod config;
pub mod convert;
pub mod nws;
pub mod periodic;

pub use config::NwsConfig;
pub use convert::build_laser_scan;
pub use nws::{NwsState, NwsStats, RangefinderNws};
pub use periodic::PeriodicTask;
