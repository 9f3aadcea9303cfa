//! On-disk layout of the configuration directory.
//!
//! Every persistent file the control plane touches lives under one home
//! directory: the configuration document, the peer identity used by the sync
//! protocol, and the HTTPS identity used by the control-plane listener.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use eyre::WrapErr as _;

/// Resolved paths inside the configuration directory.
#[derive(Debug, Clone)]
pub struct Locations {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub https_cert_file: PathBuf,
    pub https_key_file: PathBuf,
}

impl Locations {
    /// Resolves all paths from the given home directory, falling back to the
    /// platform config dir.
    pub fn resolve(home: Option<PathBuf>) -> Self {
        let home = home.unwrap_or_else(default_home);
        Self {
            config_file: home.join("config.toml"),
            cert_file: home.join("cert.pem"),
            key_file: home.join("key.pem"),
            https_cert_file: home.join("https-cert.pem"),
            https_key_file: home.join("https-key.pem"),
            home,
        }
    }

    /// Creates the home directory if it is missing, owner-only.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created or its
    /// permissions cannot be restricted; both abort startup.
    pub fn ensure_home(&self) -> eyre::Result<()> {
        fs::create_dir_all(&self.home).wrap_err_with(|| {
            format!(
                "failed to create configuration directory at {}",
                self.home.display()
            )
        })?;
        restrict_permissions(&self.home)?;
        Ok(())
    }
}

fn default_home() -> PathBuf {
    let base = env::var_os("XDG_CONFIG_HOME").map_or_else(
        || {
            let home = env::var_os("HOME").unwrap_or_else(|| ".".into());
            PathBuf::from(home).join(".config")
        },
        PathBuf::from,
    );
    base.join("syncfuse")
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> eyre::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .wrap_err_with(|| format!("failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> eyre::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_all_files_under_home() {
        let locations = Locations::resolve(Some(PathBuf::from("/tmp/sf-home")));
        assert_eq!(locations.config_file, Path::new("/tmp/sf-home/config.toml"));
        assert_eq!(locations.cert_file, Path::new("/tmp/sf-home/cert.pem"));
        assert_eq!(
            locations.https_cert_file,
            Path::new("/tmp/sf-home/https-cert.pem")
        );
    }

    #[test]
    fn ensure_home_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let locations = Locations::resolve(Some(tmp.path().join("nested").join("home")));
        locations.ensure_home().unwrap();
        assert!(locations.home.is_dir());
    }
}
