use crate::http::ClientError;
use crate::process::ProcessError;
use http_body_util::Full;
use hyper::{Response, StatusCode, body::Bytes, header};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Error creating volume {0}")]
    BackingVolume(String),

    #[error("storage service error: {0}")]
    Storage(#[from] ClientError),

    #[error("failed to mount {}: {source}", .path.display())]
    Mount {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    #[error("failed to unmount {}: {source}", .path.display())]
    Unmount {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    #[error("No mounted volume {0}")]
    NotMounted(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct DockerErrorResponse {
    #[serde(rename = "Err")]
    err: String,
}

impl PluginError {
    /// Docker expects failures as a normal 200 response with a non-null `Err`.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let err_msg = self.to_string();

        tracing::error!(error = %err_msg, "plugin request failed");

        let body = DockerErrorResponse { err: err_msg };
        let json = serde_json::to_vec(&body)
            .unwrap_or_else(|_| b"{\"Err\":\"Internal Serialization Error\"}".to_vec());

        json_response(StatusCode::OK, Bytes::from(json))
    }
}

pub(crate) fn json_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    resp
}
