//! The Docker volume plugin server.
//!
//! Listens on a Unix socket, speaks HTTP/1.1, and hands every request to
//! [`service::DockerPluginService`], which drives a
//! [`orchestrator::MountOrchestrator`].
use crate::cmd::config::plugin::PluginConfig;
use crate::error::XylemError;
use crate::http::HttpClient;
use crate::path::AbsolutePath;
use crate::process::ProcessRunner;
use crate::signal::recv_shutdown;
use crate::xylem::XylemClient;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::{error, info};

pub mod api;
pub mod driver;
pub mod error;
pub mod layout;
pub mod mounts;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod types;

use layout::VolumeLayout;
use mounts::MountTable;
use orchestrator::MountOrchestrator;
use service::DockerPluginService;

pub struct VolumePlugin {
    config: PluginConfig,
}

impl VolumePlugin {
    pub fn new(config: PluginConfig) -> Self {
        Self { config }
    }

    /// Builds the orchestrator described by the config.
    pub fn orchestrator(&self) -> Result<MountOrchestrator, XylemError> {
        let cfg = &self.config;

        let http = HttpClient::new(cfg.request_timeout)?;
        let xylem = XylemClient::new(cfg.host.clone(), cfg.port, http)
            .with_socket(cfg.xylem_socket.clone());

        let layout = VolumeLayout::new(cfg.mount_path.clone())
            .with_shared_volume(cfg.volume_name.clone())
            .with_legacy_paths(cfg.legacy_mount_paths.clone());

        Ok(MountOrchestrator::new(
            cfg.host.clone(),
            layout,
            Arc::new(xylem),
            Arc::new(ProcessRunner::new()),
        )
        .with_mount_table(MountTable::new(cfg.mount_table.clone()))
        .with_process_timeout(cfg.process_timeout))
    }

    pub async fn run(self) -> Result<(), XylemError> {
        let socket_path = &self.config.socket;

        let service = DockerPluginService::new(Arc::new(self.orchestrator()?));

        self.ensure_socket_path(socket_path).await?;
        let listener = UnixListener::bind(socket_path)?;

        info!(socket = %socket_path, "docker plugin listening");

        let exit = recv_shutdown();
        tokio::pin!(exit);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let io = TokioIo::new(stream);
                            let svc = service.clone();

                            tokio::task::spawn(async move {
                                if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                                    error!("error serving connection: {:?}", err);
                                }
                            });
                        }
                        Err(e) => error!("socket accept error: {}", e),
                    }
                }

                res = &mut exit => {
                    res?;
                    break;
                }
            }
        }

        info!("shutting down");
        Ok(())
    }

    async fn ensure_socket_path(&self, path: &AbsolutePath) -> Result<(), XylemError> {
        if path.exists() {
            info!("removing existing socket file: {}", path);
            tokio::fs::remove_file(path).await?;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

impl Drop for VolumePlugin {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.config.socket);
    }
}
