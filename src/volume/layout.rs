//! Where volumes live on the host.
//!
//! Two layouts are supported and both resolve a Docker volume `name` to
//! `<mount_path>/<name>`:
//!
//! * Per-volume: every Docker volume is its own gluster volume, mounted
//!   directly at `<mount_path>/<name>`.
//! * Shared: a single gluster volume (`volume_name`) is mounted once at
//!   `<mount_path>` and every Docker volume is a subdirectory of it.
//!
//! Legacy roots are mount paths used by earlier configurations. They are only
//! consulted on unmount, so volumes mounted before a migration can still be
//! released.
use super::types::VolumeName;
use crate::path::AbsolutePath;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct VolumeLayout {
    mount_path: AbsolutePath,
    volume_name: Option<String>,
    legacy_mount_paths: Vec<AbsolutePath>,
}

/// Candidate mountpoints for a name, legacy roots first, current root last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSet(Vec<PathBuf>);

impl PathSet {
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for PathSet {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl VolumeLayout {
    pub fn new(mount_path: AbsolutePath) -> Self {
        Self {
            mount_path,
            volume_name: None,
            legacy_mount_paths: Vec::new(),
        }
    }

    pub fn with_shared_volume(mut self, volume_name: Option<String>) -> Self {
        self.volume_name = volume_name.filter(|v| !v.is_empty());
        self
    }

    pub fn with_legacy_paths(mut self, legacy: Vec<AbsolutePath>) -> Self {
        self.legacy_mount_paths = legacy;
        self
    }

    pub fn mount_path(&self) -> &AbsolutePath {
        &self.mount_path
    }

    pub fn is_shared(&self) -> bool {
        self.volume_name.is_some()
    }

    /// The gluster volume backing `name`.
    pub fn backing_name<'a>(&'a self, name: &'a VolumeName) -> &'a str {
        self.volume_name.as_deref().unwrap_or(name.as_str())
    }

    /// Where the backing volume is mounted on this host.
    pub fn local_root(&self, name: &VolumeName) -> PathBuf {
        match self.volume_name {
            Some(_) => self.mount_path.to_path_buf(),
            None => self.current_path(name),
        }
    }

    /// The mountpoint handed to Docker for `name` under the current configuration.
    pub fn current_path(&self, name: &VolumeName) -> PathBuf {
        self.mount_path.join(name).into_inner()
    }

    pub fn path_set(&self, name: &VolumeName) -> PathSet {
        let mut paths: Vec<PathBuf> = self
            .legacy_mount_paths
            .iter()
            .map(|root| root.join(name).into_inner())
            .collect();
        paths.push(self.current_path(name));
        PathSet(paths)
    }
}
