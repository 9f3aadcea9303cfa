//! Configuration document shape.
//!
//! The same structures travel as JSON over the config endpoints (camelCase,
//! matching what the web UI reads and posts back verbatim) and as TOML on
//! disk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deviceid::{DeviceId, DeviceIdError};
use crate::humansize::{SizeParseError, parse_size};

/// The full configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigSnapshot {
    /// Device ID of this instance, derived from the peer certificate at
    /// startup. Carried in the document for the UI, ignored on replace.
    #[serde(rename = "myID")]
    pub my_id: String,
    /// Where the synchronized tree is mounted.
    pub mount_point: String,
    pub folders: Vec<FolderConfig>,
    pub devices: Vec<DeviceConfig>,
    pub options: Options,
    pub gui: GuiConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderConfig {
    pub id: String,
    /// Human-readable cache budget for this folder, e.g. `"512 MiB"`.
    pub cache_size: String,
    pub devices: Vec<FolderDevice>,
    pub pinned_files: Vec<String>,
}

/// Reference to a device a folder is shared with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDevice {
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub name: String,
    pub addresses: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            name: String::new(),
            addresses: vec!["dynamic".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub listen_address: Vec<String>,
    pub global_announce_enabled: bool,
    pub global_announce_servers: Vec<String>,
    pub local_announce_enabled: bool,
    pub local_announce_port: u16,
    #[serde(rename = "localAnnounceMCAddr")]
    pub local_announce_mc_addr: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            listen_address: vec!["tcp://0.0.0.0:22000".to_string()],
            global_announce_enabled: true,
            global_announce_servers: vec!["default".to_string()],
            local_announce_enabled: true,
            local_announce_port: 21027,
            local_announce_mc_addr: "[ff12::8384]:21027".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuiConfig {
    pub enabled: bool,
    /// Bind address of the control-plane listener.
    pub address: String,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "127.0.0.1:8384".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("folder has an empty ID")]
    EmptyFolderId,
    #[error("duplicate folder ID {0:?}")]
    DuplicateFolder(String),
    #[error("folder {folder:?} has an invalid cache size: {source}")]
    InvalidCacheSize {
        folder: String,
        source: SizeParseError,
    },
    #[error("folder {folder:?} references unknown device {device:?}")]
    UnknownDevice { folder: String, device: String },
    #[error("invalid device ID {id:?}: {source}")]
    InvalidDeviceId { id: String, source: DeviceIdError },
}

impl ConfigSnapshot {
    /// Checks the document for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first violation found; the caller reports it to the
    /// client with HTTP 400.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for device in &self.devices {
            device
                .device_id
                .parse::<DeviceId>()
                .map_err(|source| ConfigError::InvalidDeviceId {
                    id: device.device_id.clone(),
                    source,
                })?;
        }

        let mut seen = std::collections::HashSet::new();
        for folder in &self.folders {
            if folder.id.is_empty() {
                return Err(ConfigError::EmptyFolderId);
            }
            if !seen.insert(folder.id.as_str()) {
                return Err(ConfigError::DuplicateFolder(folder.id.clone()));
            }
            parse_size(&folder.cache_size).map_err(|source| ConfigError::InvalidCacheSize {
                folder: folder.id.clone(),
                source,
            })?;
            for shared in &folder.devices {
                let known = shared.device_id == self.my_id
                    || self.devices.iter().any(|d| d.device_id == shared.device_id);
                if !known {
                    return Err(ConfigError::UnknownDevice {
                        folder: folder.id.clone(),
                        device: shared.device_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
