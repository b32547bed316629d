//! Configuration vault – reads/writes `~/.rangebridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rangebridge_hal::sim::SIM_DRIVER_NAME;
use rangebridge_nws::NwsConfig;
use rangebridge_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name of the transport node the scans are published from.
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// WebSocket port streaming scans to external clients.  `0` disables
    /// the stream server.
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    /// Wrapper options.
    #[serde(default = "default_nws")]
    pub nws: NwsConfig,
}

fn default_node_name() -> String {
    "rangebridge_node".to_string()
}
fn default_stream_port() -> u16 {
    9090
}
fn default_nws() -> NwsConfig {
    NwsConfig {
        subdevice: Some(SIM_DRIVER_NAME.to_string()),
        ..NwsConfig::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            stream_port: default_stream_port(),
            nws: default_nws(),
        }
    }
}

/// Pick the config file: the first CLI argument, then `RANGEBRIDGE_CONFIG`,
/// then `~/.rangebridge/config.toml`.
pub fn resolve_path(cli_arg: Option<String>) -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    resolve_path_from(cli_arg, std::env::var("RANGEBRIDGE_CONFIG").ok(), &home)
}

pub(crate) fn resolve_path_from(
    cli_arg: Option<String>,
    env_path: Option<String>,
    home: &str,
) -> PathBuf {
    cli_arg
        .or(env_path)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_path_for_home(home))
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rangebridge").join("config.toml")
}

/// Load the config at `path` and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load(path: &Path) -> Result<Option<Config>, BridgeError> {
    let mut cfg = load_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `RANGEBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RANGEBRIDGE_TOPIC` | `nws.topic` |
/// | `RANGEBRIDGE_FRAME` | `nws.frame` |
/// | `RANGEBRIDGE_PERIOD` | `nws.period` (seconds) |
/// | `RANGEBRIDGE_SUBDEVICE` | `nws.subdevice` |
/// | `RANGEBRIDGE_STREAM_PORT` | `stream_port` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RANGEBRIDGE_TOPIC") {
        cfg.nws.topic = v;
    }
    if let Ok(v) = std::env::var("RANGEBRIDGE_FRAME") {
        cfg.nws.frame = v;
    }
    if let Ok(v) = std::env::var("RANGEBRIDGE_PERIOD")
        && let Ok(period) = v.trim().parse::<f64>()
    {
        cfg.nws.period = period;
    }
    if let Ok(v) = std::env::var("RANGEBRIDGE_SUBDEVICE") {
        cfg.nws.subdevice = Some(v);
    }
    if let Ok(v) = std::env::var("RANGEBRIDGE_STREAM_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.stream_port = port;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| BridgeError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                BridgeError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BridgeError::Serialization(format!("failed to serialize config: {e}")))?;
    write_private(path, raw.as_bytes())
        .map_err(|e| BridgeError::Config(format!("failed to write {}: {e}", path.display())))
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?
        .write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}
