use crate::config::Timeout;
use crate::logging::{Logger, LoggerArgs};
use crate::path::AbsolutePath;
use clap::Args;
use serde::{Deserialize, Serialize};
use xylem_derive::LayeredConfig;

/// Fully resolved settings for the plugin daemon.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub socket: AbsolutePath,
    pub host: String,
    pub port: u16,
    pub xylem_socket: Option<AbsolutePath>,
    pub mount_path: AbsolutePath,
    pub volume_name: Option<String>,
    pub legacy_mount_paths: Vec<AbsolutePath>,
    pub mount_table: AbsolutePath,
    pub process_timeout: Timeout,
    pub request_timeout: Timeout,
    pub logger: Logger,
}

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize, LayeredConfig)]
#[serde(rename_all = "kebab-case")]
#[xylem(try_into = "PluginConfig")]
pub struct PluginArgs {
    /// Path to the listening socket
    #[arg(long, env = "XYLEM_PLUGIN_SOCKET")]
    #[xylem(default = "/run/docker/plugins/xylem.sock")]
    pub socket: Option<AbsolutePath>,

    /// Hostname of the xylem service, also used as the gluster mount server
    #[arg(long, env = "XYLEM_HOST")]
    pub host: Option<String>,

    /// Port of the xylem service
    #[arg(long, env = "XYLEM_PORT")]
    #[xylem(default = "7701")]
    pub port: Option<u16>,

    /// Reach xylem through this local socket instead of TCP
    #[arg(long, env = "XYLEM_SOCKET")]
    #[xylem(optional)]
    pub xylem_socket: Option<AbsolutePath>,

    /// Directory under which volumes are mounted
    #[arg(long, env = "XYLEM_MOUNT_PATH")]
    #[xylem(default = "/var/lib/docker/volumes")]
    pub mount_path: Option<AbsolutePath>,

    /// Back every Docker volume with subdirectories of this single gluster volume
    #[arg(long, env = "XYLEM_VOLUME_NAME")]
    #[xylem(optional)]
    pub volume_name: Option<String>,

    /// Mount paths used by earlier configurations, checked on unmount
    #[arg(long, env = "XYLEM_LEGACY_MOUNT_PATHS", value_delimiter = ',')]
    #[serde(default)]
    pub legacy_mount_paths: Vec<AbsolutePath>,

    /// Mount table consulted before mounting
    #[arg(long, env = "XYLEM_MOUNT_TABLE")]
    #[xylem(default = "/proc/mounts")]
    pub mount_table: Option<AbsolutePath>,

    /// Upper bound on mount and umount runtime
    #[arg(long, env = "XYLEM_PROCESS_TIMEOUT")]
    #[xylem(default = "1h")]
    pub process_timeout: Option<Timeout>,

    /// Upper bound on a single xylem request
    #[arg(long, env = "XYLEM_REQUEST_TIMEOUT")]
    #[xylem(default = "60s")]
    pub request_timeout: Option<Timeout>,

    #[command(flatten)]
    #[serde(flatten)]
    pub logger: LoggerArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayeredArgs, Overlay};
    use crate::error::XylemError;
    use clap::Parser;
    use std::time::Duration;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: LayeredArgs<PluginArgs>,
    }

    fn parse(argv: &[&str]) -> LayeredArgs<PluginArgs> {
        let mut full = vec!["docker-xylem"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_defaults() {
        let cfg: PluginConfig = parse(&["--host", "gluster01"]).load().unwrap();

        assert_eq!(cfg.host, "gluster01");
        assert_eq!(cfg.port, 7701);
        assert_eq!(cfg.socket, AbsolutePath::new("/run/docker/plugins/xylem.sock"));
        assert_eq!(cfg.mount_path, AbsolutePath::new("/var/lib/docker/volumes"));
        assert_eq!(cfg.mount_table, AbsolutePath::new("/proc/mounts"));
        assert_eq!(Duration::from(cfg.process_timeout), Duration::from_secs(3600));
        assert_eq!(Duration::from(cfg.request_timeout), Duration::from_secs(60));
        assert!(cfg.volume_name.is_none());
        assert!(cfg.xylem_socket.is_none());
        assert!(cfg.legacy_mount_paths.is_empty());
    }

    #[test]
    fn test_host_is_required() {
        let err = parse(&[]).load::<PluginConfig>().unwrap_err();
        assert!(matches!(err, XylemError::Config(_)));
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_legacy_paths_are_comma_delimited() {
        let cfg: PluginConfig = parse(&[
            "--host",
            "h",
            "--legacy-mount-paths",
            "/var/lib/docker/volumes,/mnt/old",
        ])
        .load()
        .unwrap();
        assert_eq!(
            cfg.legacy_mount_paths,
            vec![
                AbsolutePath::new("/var/lib/docker/volumes"),
                AbsolutePath::new("/mnt/old")
            ]
        );
    }

    #[test]
    fn test_file_layer_under_cli() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("xylem.toml");
        std::fs::write(
            &file,
            r#"
host = "from-file"
port = 9000
volume-name = "docker"
process-timeout = "10m"
log-level = "debug"
"#,
        )
        .unwrap();

        let file_arg = file.to_string_lossy().into_owned();
        let cfg: PluginConfig = parse(&["--config", &file_arg, "--port", "7801"])
            .load()
            .unwrap();

        assert_eq!(cfg.host, "from-file");
        assert_eq!(cfg.port, 7801);
        assert_eq!(cfg.volume_name.as_deref(), Some("docker"));
        assert_eq!(Duration::from(cfg.process_timeout), Duration::from_secs(600));
        assert_eq!(cfg.logger.log_level, crate::logging::LogLevel::Debug);
    }

    #[test]
    fn test_missing_config_file_falls_back_to_args() {
        let cfg: PluginConfig = parse(&["--config", "/nonexistent/xylem.toml", "--host", "h"])
            .load()
            .unwrap();
        assert_eq!(cfg.host, "h");
    }

    #[test]
    fn test_overlay_prefers_top() {
        let base = PluginArgs {
            host: Some("base".into()),
            port: Some(1),
            ..Default::default()
        };
        let top = PluginArgs {
            port: Some(2),
            ..Default::default()
        };
        let merged = base.overlay(top);
        assert_eq!(merged.host.as_deref(), Some("base"));
        assert_eq!(merged.port, Some(2));
    }
}
