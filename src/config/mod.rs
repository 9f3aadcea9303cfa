//! Configuration document, persistence, and the live handle.
//!
//! The document itself is plain data ([`types`]); [`loader`] reads and writes
//! it as TOML in the configuration directory; [`ConfigHandle`] is the single
//! mutation point used by the HTTP config endpoint.

pub mod loader;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, watch};

pub use types::{
    ConfigError, ConfigSnapshot, DeviceConfig, FolderConfig, FolderDevice, GuiConfig, Options,
};

/// Error returned by [`ConfigHandle::replace`].
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// The posted document failed validation; the active configuration is
    /// unchanged.
    #[error(transparent)]
    Validation(#[from] ConfigError),
    /// The document was accepted and activated but could not be written to
    /// disk.
    #[error("failed to persist configuration: {0}")]
    Persist(String),
}

/// Shared handle to the live configuration.
///
/// Writers are serialized by one mutex which also guards the in-sync flag;
/// readers take a lock-free snapshot through a watch channel and observe
/// either the old or the new document, never a partial one.
#[derive(Debug)]
pub struct ConfigHandle {
    path: PathBuf,
    /// Guards mutation of the document and the in-sync flag.
    write_lock: Mutex<WriterState>,
    snapshot_rx: watch::Receiver<Arc<ConfigSnapshot>>,
}

#[derive(Debug)]
struct WriterState {
    snapshot_tx: watch::Sender<Arc<ConfigSnapshot>>,
    /// Whether the running state still matches the persisted configuration.
    /// Flips to false on every accepted write; reconciliation happens
    /// outside this crate and never through this handle.
    in_sync: bool,
}

impl ConfigHandle {
    #[must_use]
    pub fn new(path: PathBuf, initial: ConfigSnapshot) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(initial));
        Self {
            path,
            write_lock: Mutex::new(WriterState {
                snapshot_tx,
                in_sync: true,
            }),
            snapshot_rx,
        }
    }

    /// Returns the current document snapshot without taking the writer lock.
    #[must_use]
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub async fn in_sync(&self) -> bool {
        self.write_lock.lock().await.in_sync
    }

    /// Replaces the active configuration.
    ///
    /// Holds the writer lock for the whole operation. The in-sync flag drops
    /// to false as soon as a write is attempted, matching what the UI must
    /// assume: even a rejected document means someone is editing. A
    /// validation failure leaves the active document untouched; on success
    /// the new document is published atomically and persisted.
    ///
    /// # Errors
    ///
    /// [`ReplaceError::Validation`] when the document is rejected,
    /// [`ReplaceError::Persist`] when activation succeeded but the disk
    /// write failed.
    pub async fn replace(&self, mut document: ConfigSnapshot) -> Result<(), ReplaceError> {
        let mut writer = self.write_lock.lock().await;
        writer.in_sync = false;

        document.validate()?;
        // `myID` is derived from the peer certificate, not client-editable.
        document.my_id = writer.snapshot_tx.borrow().my_id.clone();

        let document = Arc::new(document);
        writer.snapshot_tx.send_replace(Arc::clone(&document));

        loader::save(&self.path, &document)
            .await
            .map_err(|e| ReplaceError::Persist(format!("{e:#}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_in(dir: &std::path::Path) -> ConfigHandle {
        ConfigHandle::new(dir.join("config.toml"), ConfigSnapshot::default())
    }

    fn valid_document() -> ConfigSnapshot {
        let mut document = ConfigSnapshot::default();
        document.mount_point = "/mnt/sync".to_string();
        document.folders.push(FolderConfig {
            id: "photos".to_string(),
            cache_size: "512 MiB".to_string(),
            devices: Vec::new(),
            pinned_files: Vec::new(),
        });
        document
    }

    #[tokio::test]
    async fn starts_in_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = handle_in(tmp.path());
        assert!(handle.in_sync().await);
    }

    #[tokio::test]
    async fn replace_clears_in_sync_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = handle_in(tmp.path());

        handle.replace(valid_document()).await.unwrap();

        assert!(!handle.in_sync().await);
        assert_eq!(handle.current().mount_point, "/mnt/sync");
        assert!(tmp.path().join("config.toml").is_file());
    }

    #[tokio::test]
    async fn rejected_replace_keeps_old_document_but_clears_in_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = handle_in(tmp.path());

        let mut bad = valid_document();
        bad.folders[0].cache_size = "bananas".to_string();

        let err = handle.replace(bad).await.unwrap_err();
        assert!(matches!(err, ReplaceError::Validation(_)));
        assert_eq!(handle.current().mount_point, "");
        assert!(!handle.in_sync().await);
    }

    #[tokio::test]
    async fn concurrent_replaces_serialize() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = Arc::new(handle_in(tmp.path()));

        let mut first = valid_document();
        first.mount_point = "/mnt/one".to_string();
        let mut second = valid_document();
        second.mount_point = "/mnt/two".to_string();

        let a = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { handle.replace(first).await }
        });
        let b = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { handle.replace(second).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let final_mount = handle.current().mount_point.clone();
        assert!(final_mount == "/mnt/one" || final_mount == "/mnt/two");
        assert!(!handle.in_sync().await);

        let persisted = loader::load_or_default(&tmp.path().join("config.toml"))
            .await
            .unwrap();
        assert_eq!(persisted.mount_point, final_mount);
    }

    #[tokio::test]
    async fn replace_preserves_derived_device_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut initial = ConfigSnapshot::default();
        initial.my_id = "LOCAL-ID".to_string();
        let handle = ConfigHandle::new(tmp.path().join("config.toml"), initial);

        let mut posted = valid_document();
        posted.my_id = "SPOOFED".to_string();
        handle.replace(posted).await.unwrap();

        assert_eq!(handle.current().my_id, "LOCAL-ID");
    }
}
