use crate::volume::api::*;
use crate::volume::driver::VolumeDriver;
use crate::volume::error::{PluginError, json_response};
use crate::volume::types::VolumeName;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info, warn};

const NOT_IMPLEMENTED: &[u8] = b"\"Not Implemented\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PluginRoute {
    Activate,
    Capabilities,
    Create,
    Get,
    List,
    Mount,
    Path,
    Remove,
    Unmount,
}

impl PluginRoute {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/Plugin.Activate" => Some(Self::Activate),
            "/VolumeDriver.Capabilities" => Some(Self::Capabilities),
            "/VolumeDriver.Create" => Some(Self::Create),
            "/VolumeDriver.Get" => Some(Self::Get),
            "/VolumeDriver.List" => Some(Self::List),
            "/VolumeDriver.Mount" => Some(Self::Mount),
            "/VolumeDriver.Path" => Some(Self::Path),
            "/VolumeDriver.Remove" => Some(Self::Remove),
            "/VolumeDriver.Unmount" => Some(Self::Unmount),
            _ => None,
        }
    }
}

/// Routes Docker plugin calls to a [`VolumeDriver`].
///
/// Every outcome, including failures, is an HTTP 200 JSON body. Docker reads
/// a non-null `Err` as the failure signal.
#[derive(Clone)]
pub struct DockerPluginService {
    driver: Arc<dyn VolumeDriver>,
}

impl DockerPluginService {
    pub fn new(driver: Arc<dyn VolumeDriver>) -> Self {
        Self { driver }
    }

    /// Handles one call given its request path and raw body.
    pub async fn dispatch(&self, path: &str, body: Bytes) -> Response<Full<Bytes>> {
        match self.handle(path, body).await {
            Ok(resp) => resp,
            Err(e) => e.into_response(),
        }
    }

    async fn handle(&self, path: &str, body: Bytes) -> Result<Response<Full<Bytes>>, PluginError> {
        info!(path, "received request");

        let Some(route) = PluginRoute::from_path(path) else {
            warn!(path, "unsupported plugin call");
            return Ok(json_response(
                StatusCode::OK,
                Bytes::from_static(NOT_IMPLEMENTED),
            ));
        };

        match route {
            PluginRoute::Activate => self.handle_activate(),
            PluginRoute::Capabilities => self.handle_capabilities(),
            PluginRoute::Create => self.handle_create(&body).await,
            PluginRoute::Get => self.handle_get(&body).await,
            PluginRoute::List => self.handle_list().await,
            PluginRoute::Mount => self.handle_mount(&body).await,
            PluginRoute::Path => self.handle_path(&body).await,
            PluginRoute::Remove => self.handle_remove(&body).await,
            PluginRoute::Unmount => self.handle_unmount(&body).await,
        }
    }

    fn handle_activate(&self) -> Result<Response<Full<Bytes>>, PluginError> {
        json_ok(&ActivateResponse {
            implements: vec!["VolumeDriver".to_string()],
        })
    }

    fn handle_capabilities(&self) -> Result<Response<Full<Bytes>>, PluginError> {
        json_ok(&CapabilitiesResponse {
            capabilities: Capabilities {
                scope: "global".into(),
            },
        })
    }

    async fn handle_create(&self, body: &[u8]) -> Result<Response<Full<Bytes>>, PluginError> {
        let name = decode_name(body)?;

        info!(volume = %name, "creating volume");
        let resp = match self.driver.create(&name).await {
            Ok(()) => ErrResponse::ok(),
            Err(e) => {
                error!(volume = %name, error = %e, "create failed");
                ErrResponse::err(e.to_string())
            }
        };
        json_ok(&resp)
    }

    async fn handle_remove(&self, body: &[u8]) -> Result<Response<Full<Bytes>>, PluginError> {
        let name = decode_name(body)?;

        info!(volume = %name, "removing volume");
        self.driver.remove(&name).await?;
        json_ok(&ErrResponse::ok())
    }

    async fn handle_mount(&self, body: &[u8]) -> Result<Response<Full<Bytes>>, PluginError> {
        let name = decode_name(body)?;

        info!(volume = %name, "mounting volume");
        let resp = match self.driver.mount(&name).await {
            Ok(path) => MountResponse {
                mountpoint: Some(path.to_string_lossy().into_owned()),
                err: None,
            },
            Err(e) => {
                error!(volume = %name, error = %e, "mount failed");
                MountResponse {
                    mountpoint: None,
                    err: Some(e.to_string()),
                }
            }
        };
        json_ok(&resp)
    }

    async fn handle_unmount(&self, body: &[u8]) -> Result<Response<Full<Bytes>>, PluginError> {
        let name = decode_name(body)?;

        info!(volume = %name, "unmounting volume");
        let resp = match self.driver.unmount(&name).await {
            Ok(()) => ErrResponse::ok(),
            Err(e) => {
                error!(volume = %name, error = %e, "unmount failed");
                ErrResponse::err(e.to_string())
            }
        };
        json_ok(&resp)
    }

    async fn handle_path(&self, body: &[u8]) -> Result<Response<Full<Bytes>>, PluginError> {
        let name = decode_name(body)?;

        let path = self.driver.path(&name).await?;
        json_ok(&MountResponse {
            mountpoint: Some(path.to_string_lossy().into_owned()),
            err: None,
        })
    }

    async fn handle_list(&self) -> Result<Response<Full<Bytes>>, PluginError> {
        let volumes = self.driver.list().await?;
        json_ok(&ListResponse { volumes, err: None })
    }

    async fn handle_get(&self, body: &[u8]) -> Result<Response<Full<Bytes>>, PluginError> {
        let name = decode_name(body)?;

        let volume = self
            .driver
            .get(&name)
            .await?
            .ok_or_else(|| PluginError::NotMounted(name.to_string()))?;
        json_ok(&GetResponse { volume, err: None })
    }
}

impl Service<Request<Incoming>> for DockerPluginService {
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move {
            let path = req.uri().path().to_string();
            let body = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => return Ok(PluginError::Internal(e.to_string()).into_response()),
            };
            Ok(svc.dispatch(&path, body).await)
        })
    }
}

fn decode_name(body: &[u8]) -> Result<VolumeName, PluginError> {
    let req: NameRequest = serde_json::from_slice(body)?;
    VolumeName::new(req.name)
}

fn json_ok<T: Serialize>(data: &T) -> Result<Response<Full<Bytes>>, PluginError> {
    let json = serde_json::to_vec(data)?;
    Ok(json_response(StatusCode::OK, Bytes::from(json)))
}
