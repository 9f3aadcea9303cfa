//! Boundary to the synchronization engine.
//!
//! The control plane only reads from the engine: live connections, per-folder
//! pin status, and path listings. [`Model`] is the read interface the HTTP
//! handlers consume; [`SharedModel`] is the in-process implementation the
//! engine's subsystems feed as peers connect and files are pinned or
//! indexed. Nothing here mutates engine state.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport statistics for one connected peer, serialized verbatim to the
/// UI; the shape is owned by the connection subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub address: String,
    pub client_version: String,
    pub in_bytes_total: u64,
    pub out_bytes_total: u64,
    pub connected_at: DateTime<Utc>,
}

/// Pin progress of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinState {
    /// All blocks are present in the local cache.
    Pinned,
    /// Blocks are still being fetched from peers.
    Fetching,
}

/// Read interface onto the sync engine.
pub trait Model: Send + Sync {
    /// Currently connected peers, keyed by device ID string.
    fn connections(&self) -> HashMap<String, ConnectionInfo>;

    /// Pin status per folder: file path to pin progress.
    fn pin_status(&self) -> HashMap<String, HashMap<String, PinState>>;

    /// Paths in `folder_id` starting with `path_prefix`, sorted.
    fn browse(&self, folder_id: &str, path_prefix: &str) -> Vec<String>;
}

#[derive(Debug, Default)]
struct ModelState {
    connections: HashMap<String, ConnectionInfo>,
    pins: HashMap<String, HashMap<String, PinState>>,
    paths: HashMap<String, BTreeSet<String>>,
}

/// In-process model registry.
///
/// The discovery/connection services and the sync engine push updates in;
/// the HTTP handlers read consistent copies out.
#[derive(Debug, Default)]
pub struct SharedModel {
    state: RwLock<ModelState>,
}

impl SharedModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self, device_id: String, info: ConnectionInfo) {
        let mut state = self.state.write().expect("model lock poisoned");
        state.connections.insert(device_id, info);
    }

    pub fn drop_connection(&self, device_id: &str) {
        let mut state = self.state.write().expect("model lock poisoned");
        state.connections.remove(device_id);
    }

    pub fn set_pin_state(&self, folder_id: &str, file: String, pin: PinState) {
        let mut state = self.state.write().expect("model lock poisoned");
        state
            .pins
            .entry(folder_id.to_string())
            .or_default()
            .insert(file, pin);
    }

    /// Replaces the indexed paths of a folder.
    pub fn set_folder_paths(&self, folder_id: &str, paths: impl IntoIterator<Item = String>) {
        let mut state = self.state.write().expect("model lock poisoned");
        state
            .paths
            .insert(folder_id.to_string(), paths.into_iter().collect());
    }
}

impl Model for SharedModel {
    fn connections(&self) -> HashMap<String, ConnectionInfo> {
        self.state
            .read()
            .expect("model lock poisoned")
            .connections
            .clone()
    }

    fn pin_status(&self) -> HashMap<String, HashMap<String, PinState>> {
        self.state.read().expect("model lock poisoned").pins.clone()
    }

    fn browse(&self, folder_id: &str, path_prefix: &str) -> Vec<String> {
        let state = self.state.read().expect("model lock poisoned");
        state.paths.get(folder_id).map_or_else(Vec::new, |paths| {
            paths
                .iter()
                .filter(|p| p.starts_with(path_prefix))
                .cloned()
                .collect()
        })
    }
}
