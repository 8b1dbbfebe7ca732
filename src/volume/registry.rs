//! In-memory record of the volumes this process has mounted.
//!
//! Nothing here is persisted. A volume mounted by an earlier instance of the
//! daemon is still on disk but unknown to a fresh registry; unmount works off
//! the configured paths rather than the registry for that reason.
use super::types::VolumeName;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct VolumeRegistry {
    entries: IndexMap<VolumeName, PathBuf>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful mount. The first recorded path for a name wins;
    /// returns `false` if the name was already known.
    pub fn record_mounted(&mut self, name: VolumeName, path: impl Into<PathBuf>) -> bool {
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, path.into());
        true
    }

    /// Drops a name. Unknown names are ignored.
    pub fn forget(&mut self, name: &VolumeName) -> Option<PathBuf> {
        self.entries.shift_remove(name)
    }

    pub fn lookup(&self, name: &VolumeName) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    /// All known volumes, in mount order.
    pub fn list_all(&self) -> impl Iterator<Item = (&VolumeName, &Path)> + '_ {
        self.entries.iter().map(|(k, v)| (k, v.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
