//! Mount and unmount orchestration.
//!
//! A mount walks four steps, each awaited in turn:
//!
//! 1. Ask xylem to create the backing volume and check that it is running.
//! 2. Mount the backing volume at its local root unless the mount table
//!    already lists that root.
//! 3. Create the per-volume directory handed back to Docker.
//! 4. Record the volume in the registry.
//!
//! Unmount runs `umount` over every candidate path (legacy roots first) and
//! treats "not mounted" as success. Candidates missing on disk are skipped
//! without running `umount`: util-linux rejects them with "no mount point
//! specified" rather than "not mounted", which would fail the whole walk. A
//! path whose existence cannot be checked is still handed to `umount`.
//!
//! Mount and unmount hold a lock keyed by backing volume for their whole
//! duration, so two requests cannot both decide the root is unmounted and
//! mount it twice. The lock covers this process only; other hosts and
//! out-of-band mounts are not coordinated.

use super::api::VolumeInfo;
use super::driver::VolumeDriver;
use super::error::PluginError;
use super::layout::VolumeLayout;
use super::mounts::MountTable;
use super::registry::VolumeRegistry;
use super::types::VolumeName;
use crate::process::{CommandRunner, DEFAULT_PROCESS_TIMEOUT, Invocation, ProcessError};
use crate::xylem::StorageService;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

pub const MOUNT_BIN: &str = "/bin/mount";
pub const UMOUNT_BIN: &str = "/bin/umount";

/// Async mutexes keyed by backing volume name. Entries are never evicted;
/// there is one per backing volume this process has touched.
#[derive(Default)]
struct NameLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NameLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct MountOrchestrator {
    host: String,
    layout: VolumeLayout,
    mounts: MountTable,
    process_timeout: Duration,
    storage: Arc<dyn StorageService>,
    runner: Arc<dyn CommandRunner>,
    registry: RwLock<VolumeRegistry>,
    locks: NameLocks,
}

impl MountOrchestrator {
    pub fn new(
        host: impl Into<String>,
        layout: VolumeLayout,
        storage: Arc<dyn StorageService>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            host: host.into(),
            layout,
            mounts: MountTable::default(),
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            storage,
            runner,
            registry: RwLock::new(VolumeRegistry::new()),
            locks: NameLocks::default(),
        }
    }

    pub fn with_mount_table(mut self, mounts: MountTable) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn with_process_timeout(mut self, timeout: impl Into<Duration>) -> Self {
        self.process_timeout = timeout.into();
        self
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    async fn ensure_backing_volume(&self, name: &VolumeName) -> Result<(), PluginError> {
        let backing = self.layout.backing_name(name);
        let volume = self.storage.create_volume(backing).await?;
        if !volume.running {
            warn!(volume = %name, backing, "backing volume is not running");
            return Err(PluginError::BackingVolume(name.to_string()));
        }
        Ok(())
    }

    async fn ensure_local_mount(&self, backing: &str, root: &Path) -> Result<(), PluginError> {
        if self.mounts.is_mounted(root).await? {
            debug!(root = %root.display(), "backing volume already mounted");
            return Ok(());
        }

        create_dir(root).await?;

        let source = format!("{}:/{}", self.host, backing);
        let invocation = Invocation::new(MOUNT_BIN)
            .args(["-t", "glusterfs"])
            .arg(source)
            .arg(root.to_string_lossy())
            .timeout(self.process_timeout);

        info!(command = %invocation, "mounting backing volume");
        self.runner
            .run(invocation)
            .await
            .map_err(|source| PluginError::Mount {
                path: root.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    /// Returns `false` when `path` was not mounted to begin with.
    async fn unmount_path(&self, path: &Path) -> Result<bool, PluginError> {
        let invocation = Invocation::new(UMOUNT_BIN)
            .arg(path.to_string_lossy())
            .timeout(self.process_timeout);

        match self.runner.run(invocation).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_mounted(&e, path) => Ok(false),
            Err(source) => Err(PluginError::Unmount {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn is_not_mounted(err: &ProcessError, path: &Path) -> bool {
    let Some(stderr) = err.stderr() else {
        return false;
    };
    let p = path.display();
    stderr.contains(&format!("{} is not mounted", p)) || stderr.contains(&format!("{}: not mounted", p))
}

async fn create_dir(path: &Path) -> Result<(), PluginError> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "path already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl VolumeDriver for MountOrchestrator {
    async fn create(&self, name: &VolumeName) -> Result<(), PluginError> {
        self.ensure_backing_volume(name).await
    }

    async fn remove(&self, name: &VolumeName) -> Result<(), PluginError> {
        // Backing data and registry entries are deliberately left alone.
        debug!(volume = %name, "remove is a no-op");
        Ok(())
    }

    async fn mount(&self, name: &VolumeName) -> Result<PathBuf, PluginError> {
        let backing = self.layout.backing_name(name);
        let _guard = self.locks.acquire(backing).await;

        self.ensure_backing_volume(name).await?;

        let root = self.layout.local_root(name);
        self.ensure_local_mount(backing, &root).await?;

        let path = self.layout.current_path(name);
        create_dir(&path).await?;

        if self
            .registry
            .write()
            .await
            .record_mounted(name.clone(), path.clone())
        {
            info!(volume = %name, path = %path.display(), "volume mounted");
        }
        Ok(path)
    }

    async fn unmount(&self, name: &VolumeName) -> Result<(), PluginError> {
        let _guard = self.locks.acquire(self.layout.backing_name(name)).await;

        for path in self.layout.path_set(name) {
            if !tokio::fs::try_exists(&path).await.unwrap_or(true) {
                debug!(path = %path.display(), "skipping missing path");
                continue;
            }
            if self.unmount_path(&path).await? {
                info!(volume = %name, path = %path.display(), "unmounted");
            } else {
                debug!(path = %path.display(), "not mounted");
            }
        }

        self.registry.write().await.forget(name);
        Ok(())
    }

    async fn path(&self, name: &VolumeName) -> Result<PathBuf, PluginError> {
        Ok(self.layout.current_path(name))
    }

    async fn list(&self) -> Result<Vec<VolumeInfo>, PluginError> {
        let registry = self.registry.read().await;
        Ok(registry
            .list_all()
            .map(|(name, path)| VolumeInfo {
                name: name.to_string(),
                mountpoint: path.to_string_lossy().into_owned(),
                status: None,
            })
            .collect())
    }

    async fn get(&self, name: &VolumeName) -> Result<Option<VolumeInfo>, PluginError> {
        let registry = self.registry.read().await;
        Ok(registry.lookup(name).map(|path| VolumeInfo {
            name: name.to_string(),
            mountpoint: path.to_string_lossy().into_owned(),
            status: Some(HashMap::new()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ClientError;
    use crate::path::AbsolutePath;
    use crate::process::ProcessOutput;
    use crate::xylem::BackingVolume;
    use std::io::Write;
    use tempfile::TempDir;

    /// Pretends to be mount/umount by editing a fake mount table.
    struct FakeRunner {
        table: PathBuf,
        calls: Mutex<Vec<String>>,
        umount_stderr: Option<String>,
        mount_stderr: Option<String>,
    }

    impl FakeRunner {
        fn new(table: PathBuf) -> Self {
            Self {
                table,
                calls: Mutex::new(Vec::new()),
                umount_stderr: None,
                mount_stderr: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn fail(program: &str, stderr: &str) -> ProcessError {
            ProcessError::Exited {
                program: program.to_string(),
                code: 32,
                stderr: stderr.to_string(),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, inv: Invocation) -> Result<ProcessOutput, ProcessError> {
            self.calls.lock().unwrap().push(inv.to_string());
            tokio::task::yield_now().await;

            let target = inv.args.last().cloned().unwrap_or_default();
            let table = std::fs::read_to_string(&self.table).unwrap_or_default();
            let mounted = crate::volume::mounts::parse(&table)
                .unwrap()
                .iter()
                .any(|e| e.fs_file == target);

            if inv.program == MOUNT_BIN {
                if let Some(stderr) = &self.mount_stderr {
                    return Err(Self::fail(MOUNT_BIN, stderr));
                }
                let mut f = std::fs::OpenOptions::new()
                    .append(true)
                    .open(&self.table)
                    .unwrap();
                writeln!(f, "{} {} fuse.glusterfs rw 0 0", inv.args[2], target).unwrap();
                return Ok(ProcessOutput::default());
            }

            if let Some(stderr) = &self.umount_stderr {
                return Err(Self::fail(UMOUNT_BIN, stderr));
            }
            if !mounted {
                return Err(Self::fail(UMOUNT_BIN, &format!("{} is not mounted", target)));
            }
            let remaining: Vec<_> = table
                .lines()
                .filter(|l| l.split_whitespace().nth(1) != Some(target.as_str()))
                .collect();
            std::fs::write(&self.table, remaining.join("\n")).unwrap();
            Ok(ProcessOutput::default())
        }
    }

    struct FakeStorage {
        running: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeStorage {
        fn new(running: bool) -> Self {
            Self {
                running,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StorageService for FakeStorage {
        async fn create_volume(&self, name: &str) -> Result<BackingVolume, ClientError> {
            self.calls.lock().unwrap().push(name.to_string());
            Ok(BackingVolume {
                running: self.running,
                ..Default::default()
            })
        }
    }

    struct Fixture {
        tmp: TempDir,
        runner: Arc<FakeRunner>,
        storage: Arc<FakeStorage>,
    }

    impl Fixture {
        fn new(running: bool) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let table = tmp.path().join("mounts");
            std::fs::write(&table, "").unwrap();
            Self {
                runner: Arc::new(FakeRunner::new(table)),
                storage: Arc::new(FakeStorage::new(running)),
                tmp,
            }
        }

        fn root(&self) -> PathBuf {
            self.tmp.path().join("volumes")
        }

        fn orchestrator(&self, layout: VolumeLayout) -> MountOrchestrator {
            MountOrchestrator::new(
                "localhost",
                layout,
                self.storage.clone(),
                self.runner.clone(),
            )
            .with_mount_table(MountTable::new(AbsolutePath::new(&self.runner.table)))
        }

        fn per_volume(&self) -> MountOrchestrator {
            self.orchestrator(VolumeLayout::new(AbsolutePath::new(self.root())))
        }
    }

    fn name(s: &str) -> VolumeName {
        VolumeName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_mount_per_volume() {
        let fx = Fixture::new(true);
        let orch = fx.per_volume();

        let path = orch.mount(&name("testvol")).await.unwrap();
        let expected = fx.root().join("testvol");

        assert_eq!(path, expected);
        assert!(expected.is_dir());
        assert_eq!(*fx.storage.calls.lock().unwrap(), vec!["testvol"]);
        assert_eq!(
            fx.runner.calls(),
            vec![format!(
                "{} -t glusterfs localhost:/testvol {}",
                MOUNT_BIN,
                expected.display()
            )]
        );

        let info = orch.get(&name("testvol")).await.unwrap().unwrap();
        assert_eq!(info.mountpoint, expected.to_string_lossy());
        assert_eq!(info.status, Some(HashMap::new()));
    }

    #[tokio::test]
    async fn test_mount_skips_already_mounted_root() {
        let fx = Fixture::new(true);
        let orch = fx.per_volume();

        orch.mount(&name("testvol")).await.unwrap();
        orch.mount(&name("testvol")).await.unwrap();

        let mounts = fx
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with(MOUNT_BIN))
            .count();
        assert_eq!(mounts, 1);
        assert_eq!(orch.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_volume_mounts_root_once() {
        let fx = Fixture::new(true);
        let orch = fx.orchestrator(
            VolumeLayout::new(AbsolutePath::new(fx.root())).with_shared_volume(Some("docker".into())),
        );

        let (na, nb) = (name("a"), name("b"));
        let (a, b) = tokio::join!(orch.mount(&na), orch.mount(&nb));
        assert_eq!(a.unwrap(), fx.root().join("a"));
        assert_eq!(b.unwrap(), fx.root().join("b"));

        assert_eq!(
            fx.runner.calls(),
            vec![format!(
                "{} -t glusterfs localhost:/docker {}",
                MOUNT_BIN,
                fx.root().display()
            )]
        );
        assert_eq!(*fx.storage.calls.lock().unwrap(), vec!["docker", "docker"]);
        assert!(fx.root().join("a").is_dir());
        assert!(fx.root().join("b").is_dir());
    }

    #[tokio::test]
    async fn test_backing_volume_not_running() {
        let fx = Fixture::new(false);
        let orch = fx.per_volume();

        let err = orch.mount(&name("testvol")).await.unwrap_err();
        assert_eq!(err.to_string(), "Error creating volume testvol");
        assert!(fx.runner.calls().is_empty());
        assert!(orch.list().await.unwrap().is_empty());

        let err = orch.create(&name("testvol")).await.unwrap_err();
        assert!(matches!(err, PluginError::BackingVolume(_)));
    }

    #[tokio::test]
    async fn test_mount_failure_is_not_registered() {
        let tmp = tempfile::tempdir().unwrap();
        let table = tmp.path().join("mounts");
        std::fs::write(&table, "").unwrap();
        let mut runner = FakeRunner::new(table.clone());
        runner.mount_stderr = Some("mount: unknown filesystem type 'glusterfs'".into());

        let orch = MountOrchestrator::new(
            "localhost",
            VolumeLayout::new(AbsolutePath::new(tmp.path().join("v"))),
            Arc::new(FakeStorage::new(true)),
            Arc::new(runner),
        )
        .with_mount_table(MountTable::new(AbsolutePath::new(&table)));

        let err = orch.mount(&name("testvol")).await.unwrap_err();
        assert!(matches!(err, PluginError::Mount { .. }));
        assert!(err.to_string().contains("unknown filesystem type"));
        assert!(orch.get(&name("testvol")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unmount_is_idempotent() {
        let fx = Fixture::new(true);
        let orch = fx.per_volume();

        orch.mount(&name("testvol")).await.unwrap();
        orch.unmount(&name("testvol")).await.unwrap();
        orch.unmount(&name("testvol")).await.unwrap();

        assert!(orch.get(&name("testvol")).await.unwrap().is_none());
        let umounts = fx
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with(UMOUNT_BIN))
            .count();
        assert_eq!(umounts, 2);
    }

    #[tokio::test]
    async fn test_unmount_walks_legacy_paths() {
        let fx = Fixture::new(true);
        let legacy = fx.tmp.path().join("legacy");
        let legacy_vol = legacy.join("testvol");
        std::fs::create_dir_all(&legacy_vol).unwrap();
        std::fs::write(
            &fx.runner.table,
            format!("localhost:/testvol {} fuse.glusterfs rw 0 0\n", legacy_vol.display()),
        )
        .unwrap();

        let orch = fx.orchestrator(
            VolumeLayout::new(AbsolutePath::new(fx.root()))
                .with_legacy_paths(vec![AbsolutePath::new(&legacy)]),
        );
        std::fs::create_dir_all(fx.root().join("testvol")).unwrap();

        orch.unmount(&name("testvol")).await.unwrap();

        assert_eq!(
            fx.runner.calls(),
            vec![
                format!("{} {}", UMOUNT_BIN, legacy_vol.display()),
                format!("{} {}", UMOUNT_BIN, fx.root().join("testvol").display()),
            ]
        );
        assert_eq!(std::fs::read_to_string(&fx.runner.table).unwrap().trim(), "");
    }

    #[tokio::test]
    async fn test_unmount_skips_paths_missing_on_disk() {
        let fx = Fixture::new(true);
        let legacy = fx.tmp.path().join("gone");
        let orch = fx.orchestrator(
            VolumeLayout::new(AbsolutePath::new(fx.root()))
                .with_legacy_paths(vec![AbsolutePath::new(&legacy)]),
        );
        std::fs::create_dir_all(fx.root().join("testvol")).unwrap();

        orch.unmount(&name("testvol")).await.unwrap();

        assert!(!legacy.exists());
        assert_eq!(
            fx.runner.calls(),
            vec![format!("{} {}", UMOUNT_BIN, fx.root().join("testvol").display())]
        );
    }

    #[tokio::test]
    async fn test_unmount_failure_aborts_and_keeps_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let table = tmp.path().join("mounts");
        std::fs::write(&table, "").unwrap();
        let root = tmp.path().join("v");
        let mut runner = FakeRunner::new(table.clone());
        runner.umount_stderr = Some("umount: target is busy".into());

        let orch = MountOrchestrator::new(
            "localhost",
            VolumeLayout::new(AbsolutePath::new(&root)),
            Arc::new(FakeStorage::new(true)),
            Arc::new(runner),
        )
        .with_mount_table(MountTable::new(AbsolutePath::new(&table)));

        orch.mount(&name("testvol")).await.unwrap();
        let err = orch.unmount(&name("testvol")).await.unwrap_err();

        assert!(matches!(err, PluginError::Unmount { .. }));
        assert!(orch.get(&name("testvol")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_path_is_current_even_when_unmounted() {
        let fx = Fixture::new(true);
        let orch = fx.per_volume();
        assert_eq!(
            orch.path(&name("never")).await.unwrap(),
            fx.root().join("never")
        );
        assert!(fx.runner.calls().is_empty());
    }

    #[test]
    fn test_not_mounted_detection() {
        let path = Path::new("/mnt/v");
        let classic = FakeRunner::fail(UMOUNT_BIN, "/mnt/v is not mounted");
        let util_linux = FakeRunner::fail(UMOUNT_BIN, "umount: /mnt/v: not mounted.");
        let other = FakeRunner::fail(UMOUNT_BIN, "umount: /mnt/other: not mounted.");
        assert!(is_not_mounted(&classic, path));
        assert!(is_not_mounted(&util_linux, path));
        assert!(!is_not_mounted(&other, path));
    }
}
