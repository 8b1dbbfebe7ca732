//! Client for the xylem storage-orchestration service.
//!
//! Xylem owns the GlusterFS volumes. The plugin only ever asks it to make sure
//! a named volume exists and is started, through the blocking queue endpoint
//! `POST /queues/gluster/wait/createvolume`.

use crate::http::{ClientError, HttpClient, JsonRequest};
use crate::path::AbsolutePath;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// State of a backing volume as reported by xylem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackingVolume {
    pub running: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub bricks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueueResponse<T> {
    result: T,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the backing volume if needed and reports whether it is running.
    async fn create_volume(&self, name: &str) -> Result<BackingVolume, ClientError>;
}

#[derive(Debug, Clone)]
pub struct XylemClient {
    host: String,
    port: u16,
    socket: Option<AbsolutePath>,
    http: HttpClient,
}

impl XylemClient {
    pub fn new(host: impl Into<String>, port: u16, http: HttpClient) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
            http,
        }
    }

    /// Reach xylem through its local control socket instead of TCP.
    pub fn with_socket(mut self, socket: Option<AbsolutePath>) -> Self {
        self.socket = socket;
        self
    }

    fn queue_url(&self, queue: &str, call: &str) -> String {
        format!(
            "http://{}:{}/queues/{}/wait/{}",
            self.host, self.port, queue, call
        )
    }
}

#[async_trait]
impl StorageService for XylemClient {
    async fn create_volume(&self, name: &str) -> Result<BackingVolume, ClientError> {
        let req = JsonRequest::post(self.queue_url("gluster", "createvolume"))
            .json(&json!({ "name": name }))
            .via_socket(self.socket.clone());

        let value = self.http.request_json(req).await?;
        let resp: QueueResponse<BackingVolume> = serde_json::from_value(value)?;
        debug!(volume = name, running = resp.result.running, "xylem createvolume");
        Ok(resp.result)
    }
}
