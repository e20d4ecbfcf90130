//! Isolation backends.
//!
//! Every backend runs one [`ExecutableUnit`] to completion or to its deadline
//! and reports what happened as a [`SandboxResult`]. Parsing the program's
//! output is left to the supervisor.

mod container;
mod process;

pub use container::{ContainerBackend, DEFAULT_NODE_IMAGE, DEFAULT_PYTHON_IMAGE};
pub use process::{IsolatedProcessBackend, ScratchDir};

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::{
    error::Error,
    languages::{ExecutableUnit, InputTransport},
    types::{BackendKind, ResourcePolicy, SandboxResult},
};

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// How this backend wants the input delivered to the program
    fn input_transport(&self) -> InputTransport;

    /// Run `unit` under `policy`, giving up after `timeout`.
    ///
    /// A deadline overrun is reported through [`SandboxResult::timed_out`];
    /// `Err` means the sandbox itself failed (provisioning, output stream).
    async fn run(
        &self,
        unit: &ExecutableUnit,
        policy: &ResourcePolicy,
        timeout: Duration,
    ) -> Result<SandboxResult, Error>;
}

/// One backend instance per [`BackendKind`]
#[derive(Clone)]
pub struct Backends {
    container: Arc<dyn SandboxBackend>,
    isolated_process: Arc<dyn SandboxBackend>,
}

impl Backends {
    pub fn new(
        container: Arc<dyn SandboxBackend>,
        isolated_process: Arc<dyn SandboxBackend>,
    ) -> Self {
        Self {
            container,
            isolated_process,
        }
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn SandboxBackend> {
        match kind {
            BackendKind::Container => &self.container,
            BackendKind::IsolatedProcess => &self.isolated_process,
        }
    }
}
