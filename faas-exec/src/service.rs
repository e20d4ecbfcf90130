use std::sync::Arc;
use tracing::debug;

use crate::{
    config::EngineConfig,
    docker::DockerClient,
    error::Error,
    executor::ExecutionSupervisor,
    metrics::MetricsSink,
    sandbox::{Backends, ContainerBackend, IsolatedProcessBackend},
    store::FunctionStore,
    types::{ExecutionOutcome, InvocationInput},
};

/// Invocation entry point: resolves a function by id and runs it
#[derive(Clone)]
pub struct FunctionService {
    store: Arc<dyn FunctionStore>,
    supervisor: Arc<ExecutionSupervisor>,
}

impl FunctionService {
    pub fn new(store: Arc<dyn FunctionStore>, supervisor: Arc<ExecutionSupervisor>) -> Self {
        Self { store, supervisor }
    }

    /// Compose the default container and process backends from `config`
    pub fn from_config(
        config: &EngineConfig,
        store: Arc<dyn FunctionStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let docker = DockerClient::new(config.docker_socket.clone())
            .with_pull_missing_images(config.pull_missing_images);
        let container = ContainerBackend::new(Arc::new(docker))
            .with_images(config.python_image.clone(), config.node_image.clone())
            .with_stop_grace(config.stop_grace());
        let process = IsolatedProcessBackend::new(config.scratch_root.clone())
            .with_kill_grace(config.kill_grace());

        let backends = Backends::new(Arc::new(container), Arc::new(process));
        let supervisor = ExecutionSupervisor::new(backends, metrics, config.policy.clone());

        Self::new(store, Arc::new(supervisor))
    }

    pub fn supervisor(&self) -> &ExecutionSupervisor {
        &self.supervisor
    }

    /// Run the function `function_id` against `input`.
    ///
    /// Only a missing function or a failing store surface as `Err`; every
    /// execution failure is reported inside the outcome.
    pub async fn invoke(
        &self,
        function_id: &str,
        input: InvocationInput,
    ) -> Result<ExecutionOutcome, Error> {
        let spec = self
            .store
            .lookup(function_id)
            .await?
            .ok_or_else(|| Error::FunctionNotFound(function_id.to_string()))?;

        debug!("Invoking function {} ({})", spec.id, spec.name);
        Ok(self.supervisor.execute(&spec, &input).await)
    }
}
