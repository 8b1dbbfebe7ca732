//! Request and response bodies of the Docker volume plugin protocol.
//!
//! Every response except `Activate` and `Capabilities` carries `Err`, which is
//! `null` on success.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of every request that names a volume. `Opts` and `ID` are accepted
/// and ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrResponse {
    pub err: Option<String>,
}

impl ErrResponse {
    pub fn ok() -> Self {
        Self { err: None }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            err: Some(msg.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    pub err: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    pub volume: VolumeInfo,
    pub err: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<VolumeInfo>,
    pub err: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub scope: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}
