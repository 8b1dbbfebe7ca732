//! Reading the live mount table.
//!
//! Parsing of `/proc/mounts` lines (`source target fstype options dump pass`,
//! octal escapes included) comes from `procfs-core`. The table path is
//! configurable so tests and unusual hosts can point at another file.
use crate::path::AbsolutePath;
use procfs_core::FromBufRead;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

pub use procfs_core::MountEntry;

pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Parses mount table content.
pub fn parse(content: &str) -> std::io::Result<Vec<MountEntry>> {
    Vec::<MountEntry>::from_buf_read(Cursor::new(content))
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e.to_string()))
}

#[derive(Debug, Clone)]
pub struct MountTable {
    path: AbsolutePath,
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new(AbsolutePath::new(PROC_MOUNTS))
    }
}

impl MountTable {
    pub fn new(path: AbsolutePath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn entries(&self) -> std::io::Result<Vec<MountEntry>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse(&content)
    }

    /// Whether anything is currently mounted at `target`.
    pub async fn is_mounted(&self, target: &Path) -> std::io::Result<bool> {
        Ok(self
            .entries()
            .await?
            .iter()
            .any(|e| Path::new(&e.fs_file) == target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
gluster01:/docker /var/lib/docker/volumes fuse.glusterfs rw,relatime,user_id=0 0 0
/dev/sda1 /mnt/data ext4 rw 0 2
";

    #[test]
    fn test_parse_fields() {
        let entries = parse(SAMPLE).unwrap();
        assert_eq!(entries.len(), 3);

        let gluster = &entries[1];
        assert_eq!(gluster.fs_spec, "gluster01:/docker");
        assert_eq!(gluster.fs_file, "/var/lib/docker/volumes");
        assert_eq!(gluster.fs_vfstype, "fuse.glusterfs");
        assert_eq!(entries[2].fs_passno, 2);
    }

    #[test]
    fn test_empty_table() {
        assert!(parse("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_is_mounted_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let table = tmp.path().join("mounts");
        std::fs::write(&table, SAMPLE).unwrap();

        let mounts = MountTable::new(AbsolutePath::new(&table));
        assert_eq!(mounts.path(), table.as_path());
        assert!(mounts.is_mounted(Path::new("/var/lib/docker/volumes")).await.unwrap());
        assert!(mounts.is_mounted(Path::new("/mnt/data")).await.unwrap());
        assert!(!mounts.is_mounted(Path::new("/var/lib/docker")).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_table_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mounts = MountTable::new(AbsolutePath::new(tmp.path().join("nope")));
        assert!(mounts.is_mounted(Path::new("/")).await.is_err());
    }
}
