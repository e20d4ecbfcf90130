//! Minimal Docker Engine API client spoken over the daemon's Unix socket.

mod frame;

pub use frame::{LogFrame, LogFrameDecoder, StreamKind, HEADER_LEN};

#[cfg(test)]
pub(crate) use frame::encode_frame;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::net::UnixStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Error;

pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Raw, still multiplexed log bytes of a container
pub type LogStream = BoxStream<'static, io::Result<Bytes>>;

/// Body of `POST /containers/create`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    pub image: String,
    pub cmd: Vec<String>,
    pub working_dir: String,
    pub network_disabled: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub memory: i64,
    /// Equal to `memory` so that no swap is available
    pub memory_swap: i64,
    pub network_mode: String,
    pub auto_remove: bool,
}

/// Container lifecycle operations used by the container backend
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container and return its id
    async fn create(&self, config: &ContainerConfig) -> Result<String, Error>;

    async fn start(&self, id: &str) -> Result<(), Error>;

    /// Follow the container's combined, framed stdout/stderr until it exits
    async fn logs(&self, id: &str) -> Result<LogStream, Error>;

    /// Wait for the container to exit and return its status code
    async fn wait(&self, id: &str) -> Result<i64, Error>;

    async fn stop(&self, id: &str) -> Result<(), Error>;

    /// Force-remove the container and its anonymous volumes
    async fn remove(&self, id: &str) -> Result<(), Error>;
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct WaitResponse {
    #[serde(rename = "StatusCode")]
    status_code: i64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Docker daemon client
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: PathBuf,
    pull_missing_images: bool,
}

impl DockerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            pull_missing_images: true,
        }
    }

    pub fn with_pull_missing_images(mut self, pull: bool) -> Self {
        self.pull_missing_images = pull;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check that the daemon answers on its socket
    pub async fn ping(&self) -> Result<(), Error> {
        let response = self.send(Method::GET, "/_ping", None).await?;
        Self::read_success(response).await.map(|_| ())
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response<Incoming>, Error> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "Failed to connect to Docker at {}: {}",
                    self.socket_path.display(),
                    e
                ),
            )
        })?;

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Docker connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "docker")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        Ok(sender.send_request(request).await?)
    }

    async fn read_success(response: Response<Incoming>) -> Result<Bytes, Error> {
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(body)
        } else {
            Err(Error::Docker {
                status: status.as_u16(),
                message: error_message(&body),
            })
        }
    }

    async fn create_named(&self, name: &str, body: &[u8]) -> Result<String, Error> {
        let response = self
            .send(
                Method::POST,
                &format!("/containers/create?name={}", name),
                Some(body.to_vec()),
            )
            .await?;
        let body = Self::read_success(response).await?;
        let created: CreateResponse = serde_json::from_slice(&body)?;
        Ok(created.id)
    }

    /// Pull `image` (`name:tag`) and wait for the pull to finish
    pub async fn pull_image(&self, image: &str) -> Result<(), Error> {
        info!("Pulling missing image {}", image);
        let response = self
            .send(
                Method::POST,
                &format!("/images/create?fromImage={}", image),
                None,
            )
            .await?;
        let body = Self::read_success(response).await?;

        // Progress is streamed as JSON lines; a failed pull still answers 200
        for line in body.split(|b| *b == b'\n') {
            if let Ok(progress) = serde_json::from_slice::<serde_json::Value>(line) {
                if let Some(message) = progress.get("error").and_then(|e| e.as_str()) {
                    return Err(Error::Docker {
                        status: 500,
                        message: message.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn create(&self, config: &ContainerConfig) -> Result<String, Error> {
        let name = format!("faas-{}", Uuid::new_v4());
        let body = serde_json::to_vec(config)?;

        match self.create_named(&name, &body).await {
            Err(Error::Docker { status: 404, .. }) if self.pull_missing_images => {
                self.pull_image(&config.image).await?;
                self.create_named(&name, &body).await
            }
            other => other,
        }
    }

    async fn start(&self, id: &str) -> Result<(), Error> {
        let response = self
            .send(Method::POST, &format!("/containers/{}/start", id), None)
            .await?;
        Self::read_success(response).await.map(|_| ())
    }

    async fn logs(&self, id: &str) -> Result<LogStream, Error> {
        let response = self
            .send(
                Method::GET,
                &format!("/containers/{}/logs?follow=1&stdout=1&stderr=1", id),
                None,
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_success(response).await.err().unwrap_or_else(|| {
                Error::Stream(format!("Unexpected response to logs request for {}", id))
            }));
        }

        Ok(response
            .into_body()
            .into_data_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            .boxed())
    }

    async fn wait(&self, id: &str) -> Result<i64, Error> {
        let response = self
            .send(Method::POST, &format!("/containers/{}/wait", id), None)
            .await?;
        let body = Self::read_success(response).await?;
        let waited: WaitResponse = serde_json::from_slice(&body)?;
        Ok(waited.status_code)
    }

    async fn stop(&self, id: &str) -> Result<(), Error> {
        let response = self
            .send(Method::POST, &format!("/containers/{}/stop?t=0", id), None)
            .await?;
        Self::read_success(response).await.map(|_| ())
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        let response = self
            .send(
                Method::DELETE,
                &format!("/containers/{}?force=1&v=1", id),
                None,
            )
            .await?;
        Self::read_success(response).await.map(|_| ())
    }
}
