use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tokio_util::{codec::FramedRead, io::StreamReader};
use tracing::{debug, warn};

use crate::{
    docker::{ContainerConfig, ContainerRuntime, HostConfig, LogFrameDecoder, StreamKind},
    error::Error,
    languages::{ExecutableUnit, InputTransport},
    sandbox::SandboxBackend,
    types::{BackendKind, Language, ResourcePolicy, SandboxResult},
};

pub const DEFAULT_PYTHON_IMAGE: &str = "python:3.11-slim";
pub const DEFAULT_NODE_IMAGE: &str = "node:20-slim";
const WORKING_DIR: &str = "/app";

/// Runs the program in a fresh, network-less, memory-capped container
pub struct ContainerBackend {
    runtime: Arc<dyn ContainerRuntime>,
    python_image: String,
    node_image: String,
    /// Budget for stopping and removing a container after its deadline
    stop_grace: Duration,
}

impl ContainerBackend {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            python_image: DEFAULT_PYTHON_IMAGE.to_string(),
            node_image: DEFAULT_NODE_IMAGE.to_string(),
            stop_grace: Duration::from_millis(500),
        }
    }

    pub fn with_images(mut self, python_image: String, node_image: String) -> Self {
        self.python_image = python_image;
        self.node_image = node_image;
        self
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn image_for(&self, language: Language) -> &str {
        match language {
            Language::Python => &self.python_image,
            Language::JavaScript => &self.node_image,
        }
    }

    pub fn container_config(&self, unit: &ExecutableUnit, policy: &ResourcePolicy) -> ContainerConfig {
        let memory = policy.memory_bytes as i64;
        ContainerConfig {
            image: self.image_for(unit.language).to_string(),
            cmd: unit.inline_command(),
            working_dir: WORKING_DIR.to_string(),
            network_disabled: policy.network_disabled,
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
            host_config: HostConfig {
                memory,
                memory_swap: memory,
                network_mode: if policy.network_disabled {
                    "none".to_string()
                } else {
                    "bridge".to_string()
                },
                auto_remove: false,
            },
        }
    }

    /// Follow the container's output until it exits, then fetch its exit status
    async fn collect(&self, id: &str) -> Result<SandboxResult, Error> {
        let logs = self
            .runtime
            .logs(id)
            .await
            .map_err(|e| Error::Stream(format!("Failed to follow container logs: {}", e)))?;

        let mut frames = FramedRead::new(StreamReader::new(logs), LogFrameDecoder);
        let mut output = Vec::new();
        let mut stderr = Vec::new();

        while let Some(frame) = frames.next().await {
            let frame = frame
                .map_err(|e| Error::Stream(format!("Failed to read container output: {}", e)))?;
            if frame.stream == StreamKind::Stderr {
                stderr.extend_from_slice(&frame.payload);
            }
            output.extend_from_slice(&frame.payload);
        }

        let status = self
            .runtime
            .wait(id)
            .await
            .map_err(|e| Error::Stream(format!("Failed to wait for container: {}", e)))?;

        Ok(SandboxResult::completed(
            output,
            String::from_utf8_lossy(&stderr).into_owned(),
            Some(status),
        ))
    }

    async fn remove(&self, id: &str) {
        if let Err(e) = self.runtime.remove(id).await {
            warn!("Failed to remove container {}: {}", id, e);
        }
    }

    /// Stop and remove a container that overran its deadline.
    ///
    /// Waits at most `stop_grace`; whatever is left continues in the background.
    async fn terminate(&self, id: String) {
        let runtime = Arc::clone(&self.runtime);
        let grace = self.stop_grace;

        let teardown = tokio::spawn(async move {
            match time::timeout(grace, runtime.stop(&id)).await {
                Ok(Ok(())) => debug!("Stopped container {}", id),
                Ok(Err(e)) => warn!("Failed to stop container {}: {}", id, e),
                Err(_) => warn!("Stop request for container {} exceeded {:?}", id, grace),
            }
            if let Err(e) = runtime.remove(&id).await {
                warn!("Failed to remove container {}: {}", id, e);
            }
        });

        if time::timeout(grace, teardown).await.is_err() {
            debug!("Container teardown continues in the background");
        }
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    fn input_transport(&self) -> InputTransport {
        InputTransport::Embedded
    }

    async fn run(
        &self,
        unit: &ExecutableUnit,
        policy: &ResourcePolicy,
        timeout: Duration,
    ) -> Result<SandboxResult, Error> {
        let config = self.container_config(unit, policy);
        debug!(
            "Container sandbox - Image: {}, memory: {} bytes",
            config.image, config.host_config.memory
        );

        let id = self
            .runtime
            .create(&config)
            .await
            .map_err(|e| Error::BackendCreation(format!("Failed to create container: {}", e)))?;

        if let Err(e) = self.runtime.start(&id).await {
            self.remove(&id).await;
            return Err(Error::BackendCreation(format!(
                "Failed to start container: {}",
                e
            )));
        }

        let collected = time::timeout(timeout, self.collect(&id)).await;
        match collected {
            Ok(result) => {
                self.remove(&id).await;
                result
            }
            Err(_) => {
                warn!("Container {} exceeded its {:?} deadline", id, timeout);
                self.terminate(id).await;
                Ok(SandboxResult::timed_out())
            }
        }
    }
}
